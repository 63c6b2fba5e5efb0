pub mod plain;
pub mod render;
pub mod terminal;

pub mod cafes;
pub mod forms;
pub mod orm;
pub mod router;
pub mod routes;
pub mod settings;
pub mod template;

inventory::collect!(crate::orm::Migration);

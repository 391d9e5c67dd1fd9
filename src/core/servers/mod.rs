pub mod nbt;
pub mod server_list;

pub use server_list::{list_servers, upsert_server, ServerEntry, UpsertOutcome};

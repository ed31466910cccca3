mod handler;
mod model;

pub use handler::{create_item, delete_item, list_items, patch_item, read_item, update_item};
pub use model::{Item, ItemPatch, ItemRequest, ListItemsQuery, MessageResponse};

pub use super::local_storage::Entity as LocalStorageEntry;

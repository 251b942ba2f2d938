pub mod mem;
pub mod persistent;
pub mod resource;
pub mod traits;
pub mod wal;

pub use mem::InMemoryStore;
pub use persistent::PersistentStore;
pub use resource::Resource;
pub use traits::*;

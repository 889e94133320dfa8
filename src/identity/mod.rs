pub mod resolver;

pub use resolver::{display_name_for, register_device, IdentityResolver, LOCAL_ID_KEY};

pub mod traits;
pub mod manager;
pub mod notifiers;

pub use manager::NotifierManager;
pub use traits::{ChangeNotifier, NotificationResult};

mod conversation;
mod directive;
mod note;
mod plan;
mod reference;
mod search;
mod session;
mod style;

pub use conversation::*;
pub use directive::*;
pub use note::*;
pub use plan::*;
pub use reference::*;
pub use search::*;
pub use session::*;
pub use style::*;

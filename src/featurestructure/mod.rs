mod category;
mod display;
mod node;
mod serialized;
mod text;
mod unify;
mod variable;

pub use category::RequiredFeatures;
pub use display::NodeDisplay;
pub use node::{Atom, Feature, Node, NodeArena, NodeIdx};
pub use serialized::SerializedNode;
pub use unify::{BindingScope, UnificationFailure};
pub use variable::{Bindings, Variable};

//! Entity selection: the selector compiler and the collection finder.

pub mod entity_finder;
pub mod selector;

pub use entity_finder::{entity_contains, order_entity_key, EntityFinder, FinderQuery, TypeHierarchy};
pub use selector::{EntityComparator, IdentityComparator, Operand, Operator, Selector, SelectorContext};

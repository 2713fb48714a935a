//! Code for handling IDs
use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use std::borrow::Borrow;
use std::hash::Hash;

/// Define a newtype wrapper around an `Rc<str>` for use as an identifier
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone, std::hash::Hash, PartialEq, Eq, PartialOrd, Ord, Debug, serde::Serialize,
            serde::Deserialize,
        )]
        /// An ID type (e.g. `StationID`)
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::rc::Rc::from(id))
            }
        }
    };
}
pub(crate) use define_id_type;

/// A collection of known IDs which can be used to validate IDs read from input files
pub trait IDCollection<ID> {
    /// Get the ID from the collection by its string representation.
    ///
    /// # Returns
    ///
    /// A copy of the ID in `self`, or an error if not found.
    fn get_id(&self, id: &str) -> Result<&ID>;
}

impl<ID> IDCollection<ID> for IndexSet<ID>
where
    ID: Eq + Hash + Borrow<str>,
{
    fn get_id(&self, id: &str) -> Result<&ID> {
        self.get(id).with_context(|| format!("Unknown ID {id} found"))
    }
}

impl<ID, V> IDCollection<ID> for IndexMap<ID, V>
where
    ID: Eq + Hash + Borrow<str>,
{
    fn get_id(&self, id: &str) -> Result<&ID> {
        self.get_key_value(id)
            .map(|(key, _)| key)
            .with_context(|| format!("Unknown ID {id} found"))
    }
}

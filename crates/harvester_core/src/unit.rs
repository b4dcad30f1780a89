use std::fmt;

use serde::{Deserialize, Serialize};

/// One independently fetchable piece of work: a listing page or a category code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitOfWork {
    Page(u32),
    Category(String),
}

impl UnitOfWork {
    pub fn category(code: impl Into<String>) -> Self {
        UnitOfWork::Category(code.into())
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            UnitOfWork::Category(code) => Some(code),
            UnitOfWork::Page(_) => None,
        }
    }

    pub fn as_page(&self) -> Option<u32> {
        match self {
            UnitOfWork::Page(page) => Some(*page),
            UnitOfWork::Category(_) => None,
        }
    }

    /// Short identifier used in artifact names.
    pub fn label(&self) -> String {
        match self {
            UnitOfWork::Page(page) => page.to_string(),
            UnitOfWork::Category(code) => code.clone(),
        }
    }
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWork::Page(page) => write!(f, "page {page}"),
            UnitOfWork::Category(code) => write!(f, "category {code}"),
        }
    }
}

use thiserror::Error;

use crate::model::{ParseCategoryError, ParseIdError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    ParseCategory(#[from] ParseCategoryError),
    #[error("badge {0} is not in the catalog")]
    UnknownBadge(String),
}

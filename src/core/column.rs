use serde::{Deserialize, Serialize};
use super::data_type::DataType;

/// Column of a physical table held by a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
}

use serde::{Deserialize, Serialize};

use super::common::Header;
use crate::model::Action;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstantActions {
    #[serde(flatten)]
    pub header: Header,
    pub actions: Vec<Action>,
}

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use super::catalog::{DocumentType, ValidityPeriod};
use crate::error::{CheckError, Result};

/// Options sent along with every flash check.
///
/// `accepted_types` is never empty: the last remaining tag cannot be toggled off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckConfiguration {
    accepted_types: BTreeSet<DocumentType>,
    validity_period: ValidityPeriod,
}

impl Default for CheckConfiguration {
    fn default() -> Self {
        Self {
            accepted_types: [
                DocumentType::BankStatement,
                DocumentType::UtilityBill,
                DocumentType::TenancyAgreement,
            ]
            .into_iter()
            .collect(),
            validity_period: ValidityPeriod::default(),
        }
    }
}

impl CheckConfiguration {
    pub fn new(
        accepted_types: impl IntoIterator<Item = DocumentType>,
        validity_period: ValidityPeriod,
    ) -> Result<Self> {
        let accepted_types: BTreeSet<DocumentType> = accepted_types.into_iter().collect();
        if accepted_types.is_empty() {
            return Err(CheckError::configuration(
                "at least one accepted document type is required",
            ));
        }
        Ok(Self {
            accepted_types,
            validity_period,
        })
    }

    pub fn accepted_types(&self) -> &BTreeSet<DocumentType> {
        &self.accepted_types
    }

    pub fn validity_period(&self) -> ValidityPeriod {
        self.validity_period
    }

    pub fn is_accepted(&self, tag: DocumentType) -> bool {
        self.accepted_types.contains(&tag)
    }

    /// Add `tag` if absent, remove it if present. Returns whether the set changed.
    pub fn toggle_type(&mut self, tag: DocumentType) -> bool {
        if self.is_accepted(tag) {
            if self.accepted_types.len() == 1 {
                debug!("Refusing to remove last accepted document type {}", tag);
                return false;
            }
            self.accepted_types.remove(&tag);
        } else {
            self.accepted_types.insert(tag);
        }
        true
    }

    pub fn select_validity(&mut self, period: ValidityPeriod) {
        self.validity_period = period;
    }

    /// Select by raw day count; anything outside the catalog is rejected and
    /// leaves the current selection untouched.
    pub fn select_validity_days(&mut self, days: u32) -> Result<()> {
        let period = ValidityPeriod::try_from(days)?;
        self.select_validity(period);
        Ok(())
    }

    /// Tags in wire order
    pub fn accepted_tags(&self) -> Vec<String> {
        self.accepted_types.iter().map(|t| t.tag().to_string()).collect()
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CheckError;

/// Document categories the verification service can accept as proof of address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BankStatement,
    UtilityBill,
    TenancyAgreement,
    DriversLicense,
    CouncilTaxBill,
    MortgageStatement,
    InsuranceDocument,
    TaxDocument,
    GovernmentLetter,
    PhoneBill,
}

impl DocumentType {
    pub const ALL: [DocumentType; 10] = [
        DocumentType::BankStatement,
        DocumentType::UtilityBill,
        DocumentType::TenancyAgreement,
        DocumentType::DriversLicense,
        DocumentType::CouncilTaxBill,
        DocumentType::MortgageStatement,
        DocumentType::InsuranceDocument,
        DocumentType::TaxDocument,
        DocumentType::GovernmentLetter,
        DocumentType::PhoneBill,
    ];

    /// Wire tag, as sent in `check_args.accepted_documents`
    pub fn tag(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "bank_statement",
            DocumentType::UtilityBill => "utility_bill",
            DocumentType::TenancyAgreement => "tenancy_agreement",
            DocumentType::DriversLicense => "drivers_license",
            DocumentType::CouncilTaxBill => "council_tax_bill",
            DocumentType::MortgageStatement => "mortgage_statement",
            DocumentType::InsuranceDocument => "insurance_document",
            DocumentType::TaxDocument => "tax_document",
            DocumentType::GovernmentLetter => "government_letter",
            DocumentType::PhoneBill => "phone_bill",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "Bank statement",
            DocumentType::UtilityBill => "Utility bill",
            DocumentType::TenancyAgreement => "Tenancy agreement",
            DocumentType::DriversLicense => "Driver's license",
            DocumentType::CouncilTaxBill => "Council tax bill",
            DocumentType::MortgageStatement => "Mortgage statement",
            DocumentType::InsuranceDocument => "Insurance document",
            DocumentType::TaxDocument => "Tax document",
            DocumentType::GovernmentLetter => "Government letter",
            DocumentType::PhoneBill => "Phone bill",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DocumentType {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == wanted)
            .ok_or_else(|| CheckError::InvalidOption {
                message: format!("unknown document type '{}'", s),
            })
    }
}

/// Maximum age of an accepted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ValidityPeriod {
    #[default]
    ThreeMonths,
    OneYear,
    FiveYears,
}

impl ValidityPeriod {
    pub const ALL: [ValidityPeriod; 3] = [
        ValidityPeriod::ThreeMonths,
        ValidityPeriod::OneYear,
        ValidityPeriod::FiveYears,
    ];

    pub fn days(&self) -> u32 {
        match self {
            ValidityPeriod::ThreeMonths => 90,
            ValidityPeriod::OneYear => 365,
            ValidityPeriod::FiveYears => 1825,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidityPeriod::ThreeMonths => "3 months",
            ValidityPeriod::OneYear => "1 year",
            ValidityPeriod::FiveYears => "5 years",
        }
    }
}

impl TryFrom<u32> for ValidityPeriod {
    type Error = CheckError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        ValidityPeriod::ALL
            .iter()
            .copied()
            .find(|p| p.days() == days)
            .ok_or_else(|| CheckError::InvalidOption {
                message: format!("validity period must be one of 90, 365 or 1825 days, got {}", days),
            })
    }
}

impl From<ValidityPeriod> for u32 {
    fn from(period: ValidityPeriod) -> Self {
        period.days()
    }
}

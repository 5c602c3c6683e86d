//! Field schema: names, kinds and plausible ranges for every domain.
//!
//! The same ranges gate pattern matches and award the plausibility bonus
//! during confidence scoring, so they live in one place.

use serde::{Deserialize, Serialize};

use super::types::InsightDomain;

// ═══════════════════════════════════════════
// Categorical enums
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPeriod {
    Daily,
    Monthly,
    Quarterly,
    Yearly,
}

impl ModelPeriod {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "daily" | "day" | "days" => Some(Self::Daily),
            "monthly" | "month" | "months" => Some(Self::Monthly),
            "quarterly" | "quarter" | "quarters" => Some(Self::Quarterly),
            "yearly" | "annual" | "annually" | "year" | "years" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestRateType {
    Fixed,
    Floating,
}

impl InterestRateType {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "fixed" | "fixed rate" | "fixed-rate" => Some(Self::Fixed),
            "floating" | "floating rate" | "floating-rate" | "variable" | "variable rate" => {
                Some(Self::Floating)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Floating => "floating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtType {
    Senior,
    Subordinated,
    Revolving,
    Term,
}

impl DebtType {
    pub fn parse(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        match lower.as_str() {
            "senior" | "senior secured" | "senior debt" | "first lien" => Some(Self::Senior),
            "subordinated" | "mezzanine" | "junior" | "second lien" => Some(Self::Subordinated),
            "revolving" | "revolver" | "rcf" | "revolving credit facility" => Some(Self::Revolving),
            "term" | "term loan" | "term loan a" | "term loan b" => Some(Self::Term),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Senior => "senior",
            Self::Subordinated => "subordinated",
            Self::Revolving => "revolving",
            Self::Term => "term",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortizationType {
    Bullet,
    Linear,
    Custom,
}

impl AmortizationType {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "bullet" | "balloon" | "interest only" | "interest-only" => Some(Self::Bullet),
            "linear" | "straight-line" | "straight line" | "amortizing" => Some(Self::Linear),
            "custom" | "sculpted" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullet => "bullet",
            Self::Linear => "linear",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitMultipleType {
    #[serde(rename = "EV/EBITDA")]
    EvEbitda,
    #[serde(rename = "P/E")]
    PriceEarnings,
    #[serde(rename = "EV/Revenue")]
    EvRevenue,
    #[serde(rename = "other")]
    Other,
}

impl ExitMultipleType {
    pub fn parse(label: &str) -> Option<Self> {
        let compact: String = label
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match compact.as_str() {
            "evebitda" | "ebitda" => Some(Self::EvEbitda),
            "pe" | "priceearnings" => Some(Self::PriceEarnings),
            "evrevenue" | "evsales" | "revenue" => Some(Self::EvRevenue),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvEbitda => "EV/EBITDA",
            Self::PriceEarnings => "P/E",
            Self::EvRevenue => "EV/Revenue",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitRoute {
    #[serde(rename = "IPO")]
    Ipo,
    #[serde(rename = "trade_sale")]
    TradeSale,
    #[serde(rename = "secondary_buyout")]
    SecondaryBuyout,
    #[serde(rename = "management_buyout")]
    ManagementBuyout,
    #[serde(rename = "refinancing")]
    Refinancing,
}

impl ExitRoute {
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ipo" | "initial_public_offering" | "listing" => Some(Self::Ipo),
            "trade_sale" | "strategic_sale" | "sale" => Some(Self::TradeSale),
            "secondary_buyout" | "sbo" | "secondary" => Some(Self::SecondaryBuyout),
            "management_buyout" | "mbo" => Some(Self::ManagementBuyout),
            "refinancing" | "refinance" | "recap" | "recapitalization" => Some(Self::Refinancing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipo => "IPO",
            Self::TradeSale => "trade_sale",
            Self::SecondaryBuyout => "secondary_buyout",
            Self::ManagementBuyout => "management_buyout",
            Self::Refinancing => "refinancing",
        }
    }
}

/// Which categorical enum a field is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    ModelPeriod,
    InterestRateType,
    DebtType,
    AmortizationType,
    ExitMultipleType,
    ExitRoute,
}

impl CategoryKind {
    /// Canonical label for `label`, or `None` if it is not a known variant.
    pub fn normalize(&self, label: &str) -> Option<&'static str> {
        match self {
            Self::ModelPeriod => ModelPeriod::parse(label).map(|v| v.as_str()),
            Self::InterestRateType => InterestRateType::parse(label).map(|v| v.as_str()),
            Self::DebtType => DebtType::parse(label).map(|v| v.as_str()),
            Self::AmortizationType => AmortizationType::parse(label).map(|v| v.as_str()),
            Self::ExitMultipleType => ExitMultipleType::parse(label).map(|v| v.as_str()),
            Self::ExitRoute => ExitRoute::parse(label).map(|v| v.as_str()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ModelPeriod => "model period",
            Self::InterestRateType => "interest rate type",
            Self::DebtType => "debt type",
            Self::AmortizationType => "amortization type",
            Self::ExitMultipleType => "exit multiple type",
            Self::ExitRoute => "exit route",
        }
    }
}

// ═══════════════════════════════════════════
// Field specs
// ═══════════════════════════════════════════

/// Declared type of a field; drives standardization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text kept as-is (trimmed).
    Text,
    /// ISO `YYYY-MM-DD` after standardization.
    Date,
    /// Monetary amount, converted into the target currency.
    Currency,
    /// ISO 4217 code.
    CurrencyCode,
    /// 0–100 scale.
    Percentage,
    /// Plain magnitude (years, multiples).
    Number,
    Category(CategoryKind),
    /// Ordered list of line items.
    Items,
}

/// One field of a domain record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Inclusive plausible range in the field's canonical unit.
    pub range: Option<(f64, f64)>,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind, range: Option<(f64, f64)>) -> Self {
        Self { name, kind, range }
    }

    pub fn in_range(&self, value: f64) -> bool {
        match self.range {
            Some((low, high)) => value >= low && value <= high,
            None => true,
        }
    }
}

use CategoryKind as C;
use FieldKind as K;

pub const HIGH_LEVEL_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("currency", K::CurrencyCode, None),
    FieldSpec::new("projectStartDate", K::Date, None),
    FieldSpec::new("projectEndDate", K::Date, None),
    FieldSpec::new("modelPeriods", K::Category(C::ModelPeriod), None),
];

pub const DEAL_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("dealName", K::Text, None),
    FieldSpec::new("dealValue", K::Currency, Some((1e6, 1e12))),
    FieldSpec::new("transactionFee", K::Percentage, Some((0.0, 10.0))),
    FieldSpec::new("dealLTV", K::Percentage, Some((10.0, 95.0))),
    FieldSpec::new("equityContribution", K::Currency, Some((1e5, 1e12))),
    FieldSpec::new("debtFinancing", K::Currency, Some((1e5, 1e12))),
];

pub const REVENUE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("revenueItems", K::Items, None),
    FieldSpec::new("totalRevenue", K::Currency, Some((1e3, 1e12))),
    FieldSpec::new("revenueGrowthRate", K::Percentage, Some((-50.0, 100.0))),
    FieldSpec::new("revenueCurrency", K::CurrencyCode, None),
];

pub const COST_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("operatingExpenses", K::Items, None),
    FieldSpec::new("capitalExpenses", K::Items, None),
    FieldSpec::new("totalOpEx", K::Currency, Some((1e3, 1e12))),
    FieldSpec::new("totalCapEx", K::Currency, Some((1e3, 1e12))),
    FieldSpec::new("costInflationRate", K::Percentage, Some((-5.0, 25.0))),
    FieldSpec::new("costCurrency", K::CurrencyCode, None),
];

pub const DEBT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("loanIssuanceFees", K::Percentage, Some((0.0, 10.0))),
    FieldSpec::new("interestRateType", K::Category(C::InterestRateType), None),
    FieldSpec::new("interestRate", K::Percentage, Some((0.1, 25.0))),
    FieldSpec::new("baseRate", K::Percentage, Some((0.0, 20.0))),
    FieldSpec::new("creditMargin", K::Percentage, Some((0.0, 15.0))),
    FieldSpec::new("loanTerm", K::Number, Some((0.5, 40.0))),
    FieldSpec::new("loanAmount", K::Currency, Some((1e5, 1e12))),
    FieldSpec::new("commitmentFee", K::Percentage, Some((0.0, 5.0))),
    FieldSpec::new("prepaymentPenalty", K::Percentage, Some((0.0, 10.0))),
    FieldSpec::new("debtType", K::Category(C::DebtType), None),
    FieldSpec::new("debtCurrency", K::CurrencyCode, None),
    FieldSpec::new("amortizationType", K::Category(C::AmortizationType), None),
];

pub const EXIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("disposalCost", K::Percentage, Some((0.0, 10.0))),
    FieldSpec::new("terminalCapRate", K::Percentage, Some((1.0, 20.0))),
    FieldSpec::new("exitMultiple", K::Number, Some((0.5, 50.0))),
    FieldSpec::new("exitMultipleType", K::Category(C::ExitMultipleType), None),
    FieldSpec::new("terminalGrowthRate", K::Percentage, Some((-5.0, 10.0))),
    FieldSpec::new("discountRate", K::Percentage, Some((1.0, 40.0))),
    FieldSpec::new("expectedExitDate", K::Date, None),
    FieldSpec::new("exitRoute", K::Category(C::ExitRoute), None),
    FieldSpec::new("targetIRR", K::Percentage, Some((0.0, 100.0))),
    FieldSpec::new("holdingPeriod", K::Number, Some((0.25, 30.0))),
];

/// Field specs of a domain. The master analysis has no flat field set.
pub fn field_specs(domain: InsightDomain) -> &'static [FieldSpec] {
    match domain {
        InsightDomain::HighLevelParameters => HIGH_LEVEL_FIELDS,
        InsightDomain::DealAssumptions => DEAL_FIELDS,
        InsightDomain::RevenueItems => REVENUE_FIELDS,
        InsightDomain::CostItems => COST_FIELDS,
        InsightDomain::DebtModel => DEBT_FIELDS,
        InsightDomain::ExitAssumptions => EXIT_FIELDS,
        InsightDomain::MasterAnalysis => &[],
    }
}

pub fn field_spec(domain: InsightDomain, name: &str) -> Option<&'static FieldSpec> {
    field_specs(domain).iter().find(|s| s.name == name)
}

pub fn field_names(domain: InsightDomain) -> Vec<&'static str> {
    field_specs(domain).iter().map(|s| s.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_extraction_domain_has_fields() {
        for domain in InsightDomain::extraction_domains() {
            assert!(!field_specs(*domain).is_empty(), "{domain} has no fields");
        }
        assert!(field_specs(InsightDomain::MasterAnalysis).is_empty());
    }

    #[test]
    fn field_names_are_unique_per_domain() {
        for domain in InsightDomain::extraction_domains() {
            let mut names = field_names(*domain);
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), before, "duplicate field in {domain}");
        }
    }

    #[test]
    fn documented_ranges() {
        let ltv = field_spec(InsightDomain::DealAssumptions, "dealLTV").unwrap();
        assert_eq!(ltv.range, Some((10.0, 95.0)));
        let rate = field_spec(InsightDomain::DebtModel, "interestRate").unwrap();
        assert_eq!(rate.range, Some((0.1, 25.0)));
        let value = field_spec(InsightDomain::DealAssumptions, "dealValue").unwrap();
        assert!(value.in_range(1e6) && value.in_range(1e12));
        assert!(!value.in_range(999_999.0));
    }

    #[test]
    fn category_normalization() {
        assert_eq!(CategoryKind::ModelPeriod.normalize("Annual"), Some("yearly"));
        assert_eq!(CategoryKind::InterestRateType.normalize("Variable"), Some("floating"));
        assert_eq!(CategoryKind::DebtType.normalize("Mezzanine"), Some("subordinated"));
        assert_eq!(CategoryKind::AmortizationType.normalize("interest-only"), Some("bullet"));
        assert_eq!(CategoryKind::ExitMultipleType.normalize("ev / ebitda"), Some("EV/EBITDA"));
        assert_eq!(CategoryKind::ExitRoute.normalize("Trade Sale"), Some("trade_sale"));
        assert_eq!(CategoryKind::ExitRoute.normalize("MBO"), Some("management_buyout"));
        assert_eq!(CategoryKind::DebtType.normalize("equity"), None);
    }

    #[test]
    fn exit_enums_serialize_to_wire_labels() {
        assert_eq!(
            serde_json::to_string(&ExitMultipleType::EvEbitda).unwrap(),
            "\"EV/EBITDA\""
        );
        assert_eq!(serde_json::to_string(&ExitRoute::Ipo).unwrap(), "\"IPO\"");
        assert_eq!(
            serde_json::to_string(&ExitRoute::SecondaryBuyout).unwrap(),
            "\"secondary_buyout\""
        );
    }
}

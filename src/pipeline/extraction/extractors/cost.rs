//! Cost items: operating and capital expense lines, totals, inflation.

use std::sync::LazyLock;

use crate::pipeline::corpus::DocumentCorpus;
use crate::pipeline::extraction::insight::InsightPayload;
use crate::pipeline::extraction::master::MasterSnapshot;
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::traits::{apply_scalar_fields, DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::{reconcile_total, ValidationContext};

use super::{apply_items, mentions_any, scan_items_into};

const OPEX_ITEMS: &str = "operatingExpenses";
const CAPEX_ITEMS: &str = "capitalExpenses";
const TOTAL_OPEX: &str = "totalOpEx";
const TOTAL_CAPEX: &str = "totalCapEx";
const INFLATION: &str = "costInflationRate";
const CURRENCY: &str = "costCurrency";

const TOTAL_TOLERANCE: f64 = 0.2;

/// Rows mentioning any of these belong to capital expenditure.
const CAPEX_KEYWORDS: &[&str] = &[
    "capex",
    "capital expenditure",
    "capital expenditures",
    "renovation",
    "refurbishment",
    "fit-out",
    "construction",
    "equipment purchase",
];

const OPEX_CATEGORIES: &[ItemCategory] = &[
    ItemCategory {
        category: "staff",
        keywords: &["salaries", "wages", "staff", "payroll", "personnel"],
    },
    ItemCategory {
        category: "property",
        keywords: &[
            "utilities",
            "maintenance",
            "repairs",
            "insurance",
            "property tax",
            "cleaning",
            "security",
        ],
    },
    ItemCategory {
        category: "administrative",
        keywords: &[
            "admin",
            "administrative",
            "marketing",
            "management fee",
            "professional fees",
            "legal",
            "audit",
        ],
    },
    ItemCategory {
        category: "other",
        keywords: &["other expenses", "sundry", "miscellaneous"],
    },
];

const CAPEX_CATEGORIES: &[ItemCategory] = &[
    ItemCategory {
        category: "renovation",
        keywords: &["renovation", "refurbishment", "fit-out"],
    },
    ItemCategory {
        category: "construction",
        keywords: &["construction"],
    },
    ItemCategory {
        category: "equipment",
        keywords: &["equipment purchase", "capex", "capital expenditure", "capital expenditures"],
    },
];

static COST_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            TOTAL_OPEX,
            vec![
                amount_after(r"total\s+(?:operating\s+(?:expenses|costs)|opex)", 1.0),
                amount_after(r"(?m:^)(?:operating\s+(?:expenses|costs)|opex)", 0.6),
            ],
        ),
        FieldPatterns::new(
            TOTAL_CAPEX,
            vec![
                amount_after(r"total\s+(?:capital\s+expenditures?|capex)", 1.0),
                amount_after(r"(?m:^)(?:capital\s+expenditures?|capex)", 0.6),
            ],
        ),
        FieldPatterns::new(
            INFLATION,
            vec![
                percent_after(r"(?:cost|expense|opex)\s+inflation(?:\s+rate)?", 1.0),
                percent_after(r"inflation(?:\s+rate)?|cpi", 0.7),
                percent_before(r"inflation", 0.6),
            ],
        ),
        FieldPatterns::new(
            CURRENCY,
            vec![
                text_after(r"cost\s+currency|expense\s+currency", 1.0),
                text_after(r"currency", 0.6),
            ],
        ),
    ]
});

pub struct CostItemsExtractor {
    deps: ExtractorDeps,
}

impl CostItemsExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for CostItemsExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::CostItems
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &COST_PATTERNS
    }

    fn currency_field(&self) -> Option<&'static str> {
        Some(CURRENCY)
    }

    fn apply_ai(&self, record: DomainRecord, payload: &InsightPayload) -> DomainRecord {
        let max = self.deps.config.max_line_items;
        let record = apply_scalar_fields(record, payload);
        let record = apply_items(record, payload, OPEX_ITEMS, max);
        apply_items(record, payload, CAPEX_ITEMS, max)
    }

    fn scan_corpus(&self, record: DomainRecord, corpus: &DocumentCorpus) -> DomainRecord {
        let max = self.deps.config.max_line_items;
        let record = scan_items_into(
            record,
            OPEX_ITEMS,
            corpus.lines().filter(|l| !mentions_any(l, CAPEX_KEYWORDS)),
            OPEX_CATEGORIES,
            max,
        );
        scan_items_into(
            record,
            CAPEX_ITEMS,
            corpus.lines().filter(|l| mentions_any(l, CAPEX_KEYWORDS)),
            CAPEX_CATEGORIES,
            max,
        )
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let mut hints = Vec::new();
        if let Some(opex) = snapshot.historical_financials.operating_expenses {
            hints.push((TOTAL_OPEX, FieldValue::Number(opex)));
        }
        if let Some(inflation) = snapshot.projection_assumptions.cost_inflation_rate {
            hints.push((INFLATION, FieldValue::Number(inflation)));
        }
        if let Some(currency) = snapshot.currency() {
            hints.push((CURRENCY, FieldValue::from(currency)));
        }
        hints
    }

    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        let record = reconcile_total(record, OPEX_ITEMS, TOTAL_OPEX, TOTAL_TOLERANCE);
        reconcile_total(record, CAPEX_ITEMS, TOTAL_CAPEX, TOTAL_TOLERANCE)
    }
}

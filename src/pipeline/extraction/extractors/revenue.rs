//! Revenue items: line items, total revenue, growth and currency.

use std::sync::LazyLock;

use crate::pipeline::corpus::DocumentCorpus;
use crate::pipeline::extraction::insight::InsightPayload;
use crate::pipeline::extraction::master::MasterSnapshot;
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::traits::{apply_scalar_fields, DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::{reconcile_total, ValidationContext};

use super::{apply_items, scan_items_into};

const ITEMS: &str = "revenueItems";
const TOTAL: &str = "totalRevenue";
const GROWTH: &str = "revenueGrowthRate";
const CURRENCY: &str = "revenueCurrency";

/// Line items may diverge from the stated total by this much.
const TOTAL_TOLERANCE: f64 = 0.2;

const REVENUE_CATEGORIES: &[ItemCategory] = &[
    ItemCategory {
        category: "rental",
        keywords: &["rent", "rental", "rental income", "lease income", "base rent"],
    },
    ItemCategory {
        category: "sales",
        keywords: &["sales", "product sales", "merchandise", "subscriptions"],
    },
    ItemCategory {
        category: "services",
        keywords: &["service", "services", "service charge", "consulting", "management fees"],
    },
    ItemCategory {
        category: "parking",
        keywords: &["parking", "car park"],
    },
    ItemCategory {
        category: "other",
        keywords: &["other income", "ancillary", "licensing", "royalties"],
    },
];

static REVENUE_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            TOTAL,
            vec![
                amount_after(
                    r"total\s+revenues?|total\s+income|total\s+turnover|gross\s+revenues?",
                    1.0,
                ),
                // Bare labels only at the start of a row; "Parking revenue" is an item.
                amount_after(r"(?m:^)(?:revenues?|turnover|net\s+sales)", 0.6),
            ],
        ),
        FieldPatterns::new(
            GROWTH,
            vec![
                percent_after(r"revenue\s+growth(?:\s+rate)?|rental\s+growth|sales\s+growth", 1.0),
                percent_before(r"(?:revenue|rental|sales)\s+growth", 0.8),
                percent_after(r"growth\s+rate|indexation", 0.6),
            ],
        ),
        FieldPatterns::new(
            CURRENCY,
            vec![
                text_after(r"revenue\s+currency", 1.0),
                text_after(r"currency", 0.6),
            ],
        ),
    ]
});

pub struct RevenueItemsExtractor {
    deps: ExtractorDeps,
}

impl RevenueItemsExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for RevenueItemsExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::RevenueItems
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &REVENUE_PATTERNS
    }

    fn currency_field(&self) -> Option<&'static str> {
        Some(CURRENCY)
    }

    fn apply_ai(&self, record: DomainRecord, payload: &InsightPayload) -> DomainRecord {
        let record = apply_scalar_fields(record, payload);
        apply_items(record, payload, ITEMS, self.deps.config.max_line_items)
    }

    fn scan_corpus(&self, record: DomainRecord, corpus: &DocumentCorpus) -> DomainRecord {
        scan_items_into(
            record,
            ITEMS,
            corpus.lines(),
            REVENUE_CATEGORIES,
            self.deps.config.max_line_items,
        )
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let mut hints = Vec::new();
        if let Some(revenue) = snapshot.historical_financials.revenue {
            hints.push((TOTAL, FieldValue::Number(revenue)));
        }
        if let Some(growth) = snapshot.projection_assumptions.revenue_growth_rate {
            hints.push((GROWTH, FieldValue::Number(growth)));
        }
        if let Some(currency) = snapshot.currency() {
            hints.push((CURRENCY, FieldValue::from(currency)));
        }
        hints
    }

    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        reconcile_total(record, ITEMS, TOTAL, TOTAL_TOLERANCE)
    }
}

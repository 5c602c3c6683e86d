//! Prompt building for the HTTP insight client.
//!
//! Each domain gets the same frame (rules, source-labelled documents) with
//! its own output schema. Documents are truncated to a character budget so a
//! large spreadsheet dump cannot crowd out the instructions.

use crate::pipeline::corpus::DocumentText;

use super::types::InsightDomain;

pub const SYSTEM_PROMPT: &str =
    "You are a financial deal analyst extracting parameters from deal documents. Output valid JSON only.";

const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

/// JSON skeleton the service is asked to fill for each domain.
pub fn response_schema(domain: InsightDomain) -> &'static str {
    match domain {
        InsightDomain::HighLevelParameters => {
            r#"{
  "currency": "ISO 4217 code or null",
  "projectStartDate": "YYYY-MM-DD or null",
  "projectEndDate": "YYYY-MM-DD or null",
  "modelPeriods": "daily|monthly|quarterly|yearly or null"
}"#
        }
        InsightDomain::DealAssumptions => {
            r#"{
  "dealName": "string or null",
  "dealValue": number or null,
  "transactionFee": percent number or null,
  "dealLTV": percent number or null,
  "equityContribution": number or null,
  "debtFinancing": number or null
}"#
        }
        InsightDomain::RevenueItems => {
            r#"{
  "revenueItems": [
    {"name": "string", "value": number, "growthType": "linear|compound|custom", "growthRate": percent number or null, "category": "string or null"}
  ],
  "totalRevenue": number or null,
  "revenueGrowthRate": percent number or null,
  "revenueCurrency": "ISO 4217 code or null"
}"#
        }
        InsightDomain::CostItems => {
            r#"{
  "operatingExpenses": [
    {"name": "string", "value": number, "growthType": "linear|compound|custom", "growthRate": percent number or null, "category": "string or null", "isFixed": true|false|null}
  ],
  "capitalExpenses": [
    {"name": "string", "value": number, "growthType": "linear|compound|custom", "growthRate": percent number or null, "category": "string or null", "depreciationYears": number or null}
  ],
  "totalOpEx": number or null,
  "totalCapEx": number or null,
  "costInflationRate": percent number or null,
  "costCurrency": "ISO 4217 code or null"
}"#
        }
        InsightDomain::DebtModel => {
            r#"{
  "loanIssuanceFees": percent number or null,
  "interestRateType": "fixed|floating or null",
  "interestRate": percent number or null,
  "baseRate": percent number or null,
  "creditMargin": percent number or null,
  "loanTerm": years or null,
  "loanAmount": number or null,
  "commitmentFee": percent number or null,
  "prepaymentPenalty": percent number or null,
  "debtType": "senior|subordinated|revolving|term or null",
  "debtCurrency": "ISO 4217 code or null",
  "amortizationType": "bullet|linear|custom or null"
}"#
        }
        InsightDomain::ExitAssumptions => {
            r#"{
  "disposalCost": percent number or null,
  "terminalCapRate": percent number or null,
  "exitMultiple": number or null,
  "exitMultipleType": "EV/EBITDA|P/E|EV/Revenue|other or null",
  "terminalGrowthRate": percent number or null,
  "discountRate": percent number or null,
  "expectedExitDate": "YYYY-MM-DD or null",
  "exitRoute": "IPO|trade_sale|secondary_buyout|management_buyout|refinancing or null",
  "targetIRR": percent number or null,
  "holdingPeriod": years or null
}"#
        }
        InsightDomain::MasterAnalysis => {
            r#"{
  "companyOverview": {"companyName": null, "industry": null, "location": null, "description": null},
  "transactionDetails": {"dealName": null, "dealValue": null, "currency": null, "closingDate": "YYYY-MM-DD or null", "transactionFee": null, "dealType": null},
  "financingStructure": {"equityContribution": null, "debtFinancing": null, "ltv": null, "interestRate": null, "loanTermYears": null},
  "historicalFinancials": {"revenue": null, "operatingExpenses": null, "ebitda": null, "netIncome": null},
  "projectionAssumptions": {"revenueGrowthRate": null, "costInflationRate": null, "projectionYears": null},
  "exitAssumptions": {"holdingPeriodMonths": null, "expectedExitDate": null, "exitMultiple": null, "exitRoute": null},
  "keyMetrics": {"targetIrr": null, "targetMoic": null},
  "dataQuality": {"completeness": null, "missingFields": [], "notes": null},
  "overallConfidence": number between 0 and 1,
  "dataSourceQuality": "high|medium|low"
}"#
        }
    }
}

fn domain_focus(domain: InsightDomain) -> &'static str {
    match domain {
        InsightDomain::HighLevelParameters => {
            "the model currency, project start and end dates, and model period granularity"
        }
        InsightDomain::DealAssumptions => {
            "the deal name, deal value, transaction fee, loan-to-value and the equity/debt split"
        }
        InsightDomain::RevenueItems => {
            "every revenue line item, total revenue and the revenue growth rate"
        }
        InsightDomain::CostItems => {
            "operating and capital expense line items, their totals and cost inflation"
        }
        InsightDomain::DebtModel => {
            "the loan terms: rates, fees, amount, term, debt type and amortization"
        }
        InsightDomain::ExitAssumptions => {
            "the exit: date, route, multiple, rates, target IRR and holding period"
        }
        InsightDomain::MasterAnalysis => {
            "a complete overview of the company, transaction, financing, historicals and exit"
        }
    }
}

/// Format documents with source labels, stopping at `max_chars` of content.
pub fn format_documents(documents: &[DocumentText], max_chars: usize) -> String {
    let mut out = String::new();
    let mut budget = max_chars;

    for doc in documents {
        if budget == 0 {
            out.push_str(TRUNCATION_MARKER);
            break;
        }
        out.push_str(&format!(
            "--- DOCUMENT: {} ({}) ---\n",
            doc.source_name,
            doc.mime_class.as_str()
        ));
        let content = truncate_chars(&doc.content, budget);
        budget -= content.chars().count();
        out.push_str(content);
        if content.len() < doc.content.len() {
            out.push_str(TRUNCATION_MARKER);
        }
        out.push('\n');
    }

    out
}

/// Longest prefix of `text` with at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the extraction prompt for one domain.
pub fn build_prompt(documents: &[DocumentText], domain: InsightDomain, max_chars: usize) -> String {
    format!(
        "Read the deal documents below and extract {focus}.\n\n\
RULES:\n\
1. Extract ONLY values stated in the documents. NEVER invent or estimate.\n\
2. For anything not stated, use null.\n\
3. Numbers are plain numbers without symbols or thousands separators; expand M/B/K.\n\
4. Percentages are on the 0-100 scale (12% -> 12).\n\
5. Dates are ISO YYYY-MM-DD.\n\
6. Optionally add \"confidence\" (0-1) for the whole answer and a \"fieldConfidence\" map per field.\n\n\
DOCUMENTS:\n\
{documents}\n\
OUTPUT FORMAT ({tag}):\n\
```json\n\
{schema}\n\
```",
        focus = domain_focus(domain),
        documents = format_documents(documents, max_chars),
        tag = domain.as_str(),
        schema = response_schema(domain),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, content: &str) -> DocumentText {
        DocumentText::new(name, content)
    }

    #[test]
    fn prompt_contains_schema_and_sources() {
        let docs = vec![doc("model.csv", "Equity Contribution,,,,,30000000\nDebt,,,,,1\nX,,,,,2")];
        let prompt = build_prompt(&docs, InsightDomain::DealAssumptions, 10_000);
        assert!(prompt.contains("--- DOCUMENT: model.csv (tabular) ---"));
        assert!(prompt.contains("\"dealLTV\""));
        assert!(prompt.contains("dealAssumptions"));
        assert!(prompt.contains("Equity Contribution"));
    }

    #[test]
    fn every_domain_has_a_schema() {
        for domain in InsightDomain::extraction_domains() {
            for field in super::super::schema::field_names(*domain) {
                assert!(
                    response_schema(*domain).contains(&format!("\"{field}\"")),
                    "{field} missing from {domain} schema"
                );
            }
        }
        assert!(response_schema(InsightDomain::MasterAnalysis).contains("overallConfidence"));
    }

    #[test]
    fn documents_are_truncated_to_budget() {
        let docs = vec![doc("a.txt", "abcdefghij"), doc("b.txt", "klmnop")];
        let out = format_documents(&docs, 12);
        assert!(out.contains("abcdefghij"));
        assert!(out.contains("kl"));
        assert!(!out.contains("klm"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("€€€", 2), "€€");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}

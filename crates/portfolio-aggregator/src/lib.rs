//! Holdings ingestion, portfolio aggregation and export for reverse-DCF runs.

pub mod aggregate;
pub mod export;
pub mod fundamentals;
pub mod holdings;

pub use aggregate::{aggregate, aggregate_filtered, aggregate_merged, summarize, MERGED_LABEL};
pub use export::{
    export_breakdowns, write_breakdown_csv, write_results_csv, write_summary_csv, write_to_path,
    EvaluationReport,
};
pub use fundamentals::FundamentalsTable;
pub use holdings::{load_holdings, parse_holdings_csv};

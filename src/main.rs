use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use dealscope::config::{self, InsightSettings};
use dealscope::pipeline::corpus::SourceFile;
use dealscope::pipeline::extraction::{
    DocumentInsightService, ExtractionConfig, ExtractionOrchestrator, OllamaInsightClient,
    UnavailableInsightService,
};

/// Extract deal parameters from text documents and print them as JSON.
#[derive(Parser, Debug)]
#[command(name = "dealscope", version, about)]
struct Cli {
    /// Currency every monetary field is converted into.
    #[arg(long, env = "DEALSCOPE_TARGET_CURRENCY", default_value = "USD")]
    target_currency: String,

    /// Insight service base URL (overrides DEALSCOPE_INSIGHT_URL).
    #[arg(long)]
    insight_url: Option<String>,

    /// Model name (overrides DEALSCOPE_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Per-call timeout in seconds (overrides DEALSCOPE_INSIGHT_TIMEOUT_SECS).
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip the insight service; patterns and derivations only.
    #[arg(long)]
    offline: bool,

    /// Print the flat form payload instead of the full report.
    #[arg(long)]
    form: bool,

    /// Text documents to extract from.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

// The blocking HTTP client must be built and dropped outside the runtime.
fn main() -> anyhow::Result<()> {
    dealscope::init_tracing();
    let cli = Cli::parse();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let mut settings = InsightSettings::from_env()?;
    if let Some(url) = cli.insight_url {
        settings.base_url = url;
    }
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(secs) = cli.timeout_secs {
        anyhow::ensure!(secs > 0, "--timeout-secs must be greater than zero");
        settings.timeout_secs = secs;
    }

    let config = ExtractionConfig {
        target_currency: cli.target_currency,
        insight_timeout_ms: settings.timeout_secs * 1000,
        ..Default::default()
    };

    let service: Arc<dyn DocumentInsightService> = if cli.offline {
        tracing::info!("Offline mode, insight service disabled");
        Arc::new(UnavailableInsightService)
    } else {
        tracing::info!(url = %settings.base_url, model = %settings.model, "Using insight service");
        Arc::new(OllamaInsightClient::from_settings(&settings, config.max_prompt_chars)?)
    };

    let files = cli
        .files
        .iter()
        .map(|path| {
            SourceFile::read(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let orchestrator = ExtractionOrchestrator::new(service, config);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = runtime.block_on(orchestrator.run(files));

    let output = if cli.form {
        serde_json::to_string_pretty(&report.form_payload())?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{output}");
    Ok(())
}

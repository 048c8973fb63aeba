use anyhow::Context;
use clap::{Parser, Subcommand};
use ridewise::{
    resolve_request, CachedGeocoder, ClientConfig, HttpRidePriceClient, NominatimGeocoder,
    NormalizedRides, NormalizerConfig, RideFilter, RideNormalizer, RideOption, RideSearch,
    GeocoderConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ridewise")]
#[command(about = "Compare ride prices across providers")]
struct Cli {
    /// Normalizer configuration (JSON); built-in Uber and Rapido setup when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Normalize a saved aggregate response
    Normalize {
        file: PathBuf,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        company: Option<String>,
    },
    /// Geocode two places and fetch live prices between them
    Search {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ridewise=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NormalizerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => NormalizerConfig::default(),
    };
    let normalizer = Arc::new(RideNormalizer::new(config)?);

    match cli.command {
        Commands::Normalize {
            file,
            category,
            company,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let rides = normalizer.normalize_str(&content)?;
            let filter = RideFilter {
                category,
                company,
                ..Default::default()
            };
            let options = normalizer.filter_options(&rides, &filter);
            report(&normalizer, &rides, &options, cli.json)?;
        }
        Commands::Search { from, to, base_url } => {
            let geocoder = CachedGeocoder::new(
                NominatimGeocoder::new(&GeocoderConfig::default())?,
                &GeocoderConfig::default(),
            );
            let request = resolve_request(&geocoder, &from, &to).await?;

            let client = HttpRidePriceClient::new(ClientConfig {
                base_url,
                ..Default::default()
            })?;
            let search = RideSearch::new(client, Arc::clone(&normalizer));
            let rides = search.search(&request).await?;
            report(&normalizer, &rides, &rides.options, cli.json)?;
        }
    }

    Ok(())
}

fn report(
    normalizer: &RideNormalizer,
    rides: &NormalizedRides,
    options: &[RideOption],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let mut shown = rides.clone();
        shown.options = options.to_vec();
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if let Some(notice) = rides.notice() {
        println!("({})", notice);
    }

    for (category, members) in normalizer.group_by_category(options) {
        println!("{}", category);
        for ride in members {
            let eta = if ride.eta.is_empty() { "-" } else { ride.eta.as_str() };
            println!(
                "  {:<8} {:<20} {:<12} {}",
                ride.company, ride.fleet_type, eta, ride.price
            );
        }
    }

    Ok(())
}

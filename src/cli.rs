//! Command-line surface over the drug lookup service.

use clap::{Parser, Subcommand};

use crate::render::json::to_pretty;
use crate::service::DrugService;

#[derive(Parser)]
#[command(
    name = "lactamed",
    version,
    about = "Breastfeeding drug-compatibility lookup"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the upstream for suggestion candidates
    Search {
        /// Free-text drug name
        query: String,
    },
    /// Resolve a drug name to its full compatibility record
    Details {
        /// Free-text drug name
        name: String,
    },
    /// Look up several names in one politely paced batch
    Batch {
        /// Drug names, resolved strictly sequentially
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Probe upstream availability with a synthetic query
    Health,
    /// Drop all cached search results and detail records
    CacheClear,
}

pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let service = DrugService::new()?;

    let output = match cli.command {
        Commands::Search { query } => to_pretty(&service.search(&query).await?)?,
        Commands::Details { name } => match service.drug_details(&name).await? {
            Some(details) => to_pretty(&details)?,
            None => to_pretty(&serde_json::Value::Null)?,
        },
        Commands::Batch { names } => to_pretty(&service.search_many(&names).await)?,
        Commands::Health => to_pretty(&serde_json::json!({
            "healthy": service.is_healthy().await
        }))?,
        Commands::CacheClear => {
            service.clear_cache();
            to_pretty(&serde_json::json!({"cleared": true}))?
        }
    };

    service.close();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_each_subcommand() {
        let cli = Cli::try_parse_from(["lactamed", "search", "ibuprofen"]).expect("parse");
        assert!(matches!(cli.command, Commands::Search { .. }));

        let cli = Cli::try_parse_from(["lactamed", "details", "valproic acid"]).expect("parse");
        match cli.command {
            Commands::Details { name } => assert_eq!(name, "valproic acid"),
            _ => panic!("expected details subcommand"),
        }

        let cli = Cli::try_parse_from(["lactamed", "batch", "aspirin", "codeine"]).expect("parse");
        match cli.command {
            Commands::Batch { names } => assert_eq!(names, vec!["aspirin", "codeine"]),
            _ => panic!("expected batch subcommand"),
        }

        assert!(Cli::try_parse_from(["lactamed", "health"]).is_ok());
        assert!(Cli::try_parse_from(["lactamed", "cache-clear"]).is_ok());
    }

    #[test]
    fn batch_requires_at_least_one_name() {
        assert!(Cli::try_parse_from(["lactamed", "batch"]).is_err());
    }
}

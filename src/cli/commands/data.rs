use clap::Subcommand;

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_records, output_success, parse_search_terms, read_json_stdin};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "List every record in a collection")]
    List {
        #[arg(help = "Collection name")]
        record: String,
    },

    #[command(about = "Show one record")]
    Get {
        #[arg(help = "Collection name")]
        record: String,
        #[arg(help = "Record ID")]
        id: String,
    },

    #[command(about = "Create record from stdin")]
    Create {
        #[arg(help = "Collection name")]
        record: String,
    },

    #[command(about = "Update record fields from stdin")]
    Update {
        #[arg(help = "Collection name")]
        record: String,
        #[arg(help = "Record ID to update")]
        id: String,
    },

    #[command(about = "Delete a record")]
    Delete {
        #[arg(help = "Collection name")]
        record: String,
        #[arg(help = "Record ID to delete")]
        id: String,
    },

    #[command(about = "Find records whose fields start with the given prefixes")]
    Search {
        #[arg(help = "Collection name")]
        record: String,
        #[arg(help = "Search terms as field=prefix (prefix is a regular expression)")]
        terms: Vec<String>,
    },
}

pub async fn handle(cmd: DataCommands, server: Option<&str>, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::from_saved(server)?;

    match cmd {
        DataCommands::List { record } => {
            let records = client.list(&record).await?;
            output_records(output_format, &records)
        }
        DataCommands::Get { record, id } => {
            let doc = client.get(&record, &id).await?;
            output_records(output_format, &doc)
        }
        DataCommands::Create { record } => {
            let doc = read_json_stdin()?;
            let created = client.create(&record, &doc).await?;
            output_records(output_format, &created)
        }
        DataCommands::Update { record, id } => {
            let changes = read_json_stdin()?;
            let updated = client.update(&record, &id, &changes).await?;
            output_records(output_format, &updated)
        }
        DataCommands::Delete { record, id } => {
            client.delete(&record, &id).await?;
            output_success(output_format, &format!("Deleted {} from {}", id, record), None)
        }
        DataCommands::Search { record, terms } => {
            let terms = parse_search_terms(&terms)?;
            let records = client.search(&record, &terms).await?;
            output_records(output_format, &records)
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use snowpipe_csv_load::{
    ConfigLocation, Error, LoadReport, LoadSettings, MemoryStore, SnowpipeStore, load_with,
};

#[derive(Parser)]
#[command(
    version,
    about = "Load a delimited file into a Snowflake table in fixed-size batches"
)]
struct Cli {
    /// JSON job settings; flags below override its values
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Input file with a header row
    #[arg(long)]
    file: Option<PathBuf>,

    /// Target table
    #[arg(long)]
    table: Option<String>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    schema: Option<String>,

    /// Field delimiter: ',' or ';'
    #[arg(long)]
    delimiter: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Column to reformat as a timestamp (repeatable)
    #[arg(long = "timestamp-column")]
    timestamp_columns: Vec<String>,

    /// strptime-style format of the timestamp columns
    #[arg(long)]
    timestamp_format: Option<String>,

    /// Connection config: a JSON file path, `env` or `secret`
    #[arg(long, default_value = "env")]
    connection: String,

    /// Validate and transform without writing anywhere
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<LoadSettings, Error> {
        let mut settings = match &self.settings {
            Some(path) => LoadSettings::from_file(path)?,
            None => LoadSettings::new(PathBuf::new(), String::new()),
        };
        if let Some(file) = &self.file {
            settings.file = file.clone();
        }
        if let Some(table) = &self.table {
            settings.table = table.clone();
        }
        if let Some(database) = &self.database {
            settings.database = database.clone();
        }
        if let Some(schema) = &self.schema {
            settings.schema = schema.clone();
        }
        if let Some(delimiter) = &self.delimiter {
            settings.delimiter = delimiter.parse()?;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if !self.timestamp_columns.is_empty() {
            settings.timestamp_columns = self.timestamp_columns.clone();
        }
        if let Some(format) = &self.timestamp_format {
            settings.timestamp_format = format.clone();
        }
        Ok(settings)
    }
}

fn run(cli: &Cli) -> Result<LoadReport, Error> {
    let settings = cli.load_settings()?;

    if cli.dry_run {
        return load_with(&settings, || Ok(MemoryStore::new()));
    }

    load_with(&settings, || {
        let location: ConfigLocation = cli.connection.parse()?;
        let store = SnowpipeStore::connect(location, &settings)?;
        info!(
            "loading into {}.{}.{} via channel '{}'",
            settings.database,
            settings.schema,
            settings.table,
            store.channel_name()
        );
        Ok(store)
    })
}

fn main() -> ExitCode {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => {
            info!(
                "data insertion complete: {} rows in {} batches, {} timestamps set to NULL",
                report.rows_inserted,
                report.batches,
                report.parse_warning_count
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("load failed: {err}");
            ExitCode::FAILURE
        }
    }
}

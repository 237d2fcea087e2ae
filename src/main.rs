use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ipdata::{
    convert, qqwry, Adapter, BatchEmitter, CsvSource, HeaderPolicy, Parts, Placeholders, Schema, Settings,
    SqlScript, SqliteStore, Summary, TextSource, Unit,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ipdata")]
#[command(author, version, about = "Convert IP geolocation datasets into address range tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log every skipped row and flushed batch
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a pipe-delimited ip2region dump (ip.merge.txt)
    Text {
        #[command(flatten)]
        io: IoArgs,

        /// Column separator
        #[arg(long, default_value_t = '|')]
        delimiter: char,
    },
    /// Convert a CSV file
    Csv {
        #[command(flatten)]
        io: IoArgs,

        #[arg(long, value_enum, default_value_t = CsvFormat::Custom)]
        format: CsvFormat,

        /// Whether the first row is a header
        #[arg(long, value_enum, default_value_t = Header::Auto)]
        header: Header,
    },
    /// Convert a legacy QQWry.dat database
    Qqwry {
        #[command(flatten)]
        io: IoArgs,

        /// Encoding of the strings in the database
        #[arg(long, value_enum, default_value_t = StringEncoding::Gbk)]
        encoding: StringEncoding,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input file
    input: PathBuf,

    #[command(flatten)]
    destination: Destination,

    /// Remove existing ranges before importing
    #[arg(long)]
    clear: bool,

    /// Ranges per INSERT statement or transaction
    #[arg(long, env = "IPDATA_BATCH_SIZE", default_value_t = ipdata::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Database named in the script's USE statement
    #[arg(long, env = "IPDATA_DATABASE", default_value = ipdata::config::DEFAULT_DATABASE)]
    database: String,

    #[arg(long, env = "IPDATA_TABLE", default_value = ipdata::config::DEFAULT_TABLE)]
    table: String,

    /// Text stored when no locality is known
    #[arg(long)]
    unknown_region: Option<String>,

    /// Text stored when no provider is known
    #[arg(long)]
    unknown_provider: Option<String>,

    /// Leave a part out of the stored text (repeatable)
    #[arg(long, value_enum)]
    omit: Vec<Part>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Destination {
    /// SQL script to write
    output: Option<PathBuf>,

    /// Write directly into this SQLite database instead
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CsvFormat {
    /// start_ip,end_ip,address1,address2
    Custom,
    /// network,country,region,isp
    Network,
    Geoip2,
    Ip2location,
}

#[derive(Clone, Copy, ValueEnum)]
enum StringEncoding {
    Gbk,
    Utf8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Header {
    Auto,
    Yes,
    No,
}

#[derive(Clone, Copy, ValueEnum)]
enum Part {
    Country,
    Region,
    Province,
    City,
    Isp,
}

impl From<Part> for Parts {
    fn from(part: Part) -> Parts {
        match part {
            Part::Country => Parts::COUNTRY,
            Part::Region => Parts::REGION,
            Part::Province => Parts::PROVINCE,
            Part::City => Parts::CITY,
            Part::Isp => Parts::ISP,
        }
    }
}

impl IoArgs {
    fn settings(&self, header: HeaderPolicy) -> anyhow::Result<Settings> {
        let defaults = Placeholders::default();
        let settings = Settings {
            batch_size: self.batch_size,
            database: self.database.clone(),
            table: self.table.clone(),
            placeholders: Placeholders {
                locality: self.unknown_region.clone().unwrap_or(defaults.locality),
                provider: self.unknown_provider.clone().unwrap_or(defaults.provider),
            },
            header,
        };
        Ok(settings.validate()?)
    }

    fn schema(&self, schema: Schema) -> Schema {
        let omitted = self.omit.iter().fold(Parts::empty(), |acc, &part| acc | Parts::from(part));
        schema.select(Parts::all() - omitted)
    }

    /// Checked before any output is created.
    fn input(&self) -> anyhow::Result<&Path> {
        if !self.input.is_file() {
            bail!("input file does not exist: {}", self.input.display());
        }
        Ok(&self.input)
    }

    fn open_input(&self) -> anyhow::Result<BufReader<File>> {
        let path = self.input()?;
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(BufReader::new(file))
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Text { io, delimiter } => {
            let settings = io.settings(HeaderPolicy::Absent)?;
            let source = TextSource::new(io.open_input()?, delimiter, Adapter::new(io.schema(Schema::ip2region())));
            run(&io, &settings, "ip2region", source)
        }
        Command::Csv { io, format, header } => {
            let header = match header {
                Header::Auto => HeaderPolicy::Auto,
                Header::Yes => HeaderPolicy::Present,
                Header::No => HeaderPolicy::Absent,
            };
            let settings = io.settings(header)?;
            let schema = match format {
                CsvFormat::Custom => Schema::custom(),
                CsvFormat::Network => Schema::network(),
                CsvFormat::Geoip2 => Schema::geoip2(),
                CsvFormat::Ip2location => Schema::ip2location(),
            };
            let adapter = Adapter::new(io.schema(schema));
            let name = adapter.schema().name();
            let source = CsvSource::new(io.open_input()?, adapter, settings.header);
            run(&io, &settings, name, source)
        }
        Command::Qqwry { io, encoding } => {
            let settings = io.settings(HeaderPolicy::Absent)?;
            let path = io.input()?;
            let encoding = match encoding {
                StringEncoding::Gbk => qqwry::Encoding::Gbk,
                StringEncoding::Utf8 => qqwry::Encoding::Utf8,
            };
            let db = qqwry::Database::open(path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .with_encoding(encoding);
            info!(records = db.len(), ?encoding, "opened legacy database");
            run(&io, &settings, "qqwry", db.units())
        }
    }
}

fn run<I>(io: &IoArgs, settings: &Settings, source: &str, units: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = ipdata::Result<Unit>>,
{
    info!(input = %io.input.display(), source, "starting conversion");

    match (&io.destination.output, &io.destination.sqlite) {
        (_, Some(path)) => {
            let mut store = SqliteStore::open(path, &settings.table)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            if io.clear {
                store.clear()?;
            }
            let emitter = BatchEmitter::new(store, settings.batch_size);
            let (store, summary) = convert(units, emitter, &settings.placeholders)?;
            report(&summary, path);
            info!(rows = store.count()?, "ranges in table");
        }
        (Some(path), None) => {
            let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            let script = SqlScript::new(BufWriter::new(file), source, &settings.database, &settings.table, io.clear)?;
            let emitter = BatchEmitter::new(script, settings.batch_size);
            let (script, summary) = convert(units, emitter, &settings.placeholders)?;
            script.finish(summary.valid, summary.errors())?;
            report(&summary, path);
        }
        (None, None) => bail!("no output file or database given"),
    }
    Ok(())
}

fn report(summary: &Summary, output: &Path) {
    info!(
        valid = summary.valid,
        malformed = summary.malformed,
        rejected = summary.rejected,
        skipped = summary.skipped,
        batches = summary.batches.batches,
        failed_batches = summary.batches.failed_batches,
        output = %output.display(),
        "conversion complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_destination() {
        // A stray variable must not turn script mode into a conflict.
        std::env::set_var("IPDATA_SQLITE", "/tmp/ipdata.sqlite");
        let cli = Cli::try_parse_from(["ipdata", "text", "in.txt", "out.sql"]).unwrap();
        match cli.command {
            Command::Text { io, .. } => {
                assert_eq!(io.destination.output, Some(PathBuf::from("out.sql")));
                assert_eq!(io.destination.sqlite, None);
            }
            _ => panic!("expected text command"),
        }

        let cli = Cli::try_parse_from(["ipdata", "qqwry", "qqwry.dat", "--sqlite", "ip.sqlite"]).unwrap();
        match cli.command {
            Command::Qqwry { io, encoding } => {
                assert_eq!(io.destination.sqlite, Some(PathBuf::from("ip.sqlite")));
                assert!(matches!(encoding, StringEncoding::Gbk));
            }
            _ => panic!("expected qqwry command"),
        }

        assert!(Cli::try_parse_from(["ipdata", "text", "in.txt", "out.sql", "--sqlite", "ip.sqlite"]).is_err());
        assert!(Cli::try_parse_from(["ipdata", "text", "in.txt"]).is_err());
    }
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bio::io::fasta;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use treat::classify::{AlignmentView, NeedlemanWunsch};
use treat::query::report::{self, Metric};
use treat::query::SearchFields;
use treat::sequence::Orientation;
use treat::sequence::Fragment;
use treat::storage::{try_load_sample, LoadConfig, Storage};

#[derive(Parser, Debug)]
#[command(name = "treat", about = "Classify and query RNA editing in sequenced fragments")]
struct Cli {
    /// Path to the alignment store.
    #[arg(long, global = true, default_value = "treat.db")]
    db: PathBuf,
    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a gene template and load one or more samples.
    Load {
        /// Gene name.
        #[arg(long)]
        gene: String,
        /// Template FASTA: full edited, pre edited, then alternative records.
        #[arg(long)]
        template: PathBuf,
        /// Fragment FASTA files; each file stem names a sample.
        fragments: Vec<PathBuf>,
        /// Replicate number recorded for every sample.
        #[arg(long, default_value_t = 1)]
        replicate: u8,
        /// Scale factor applied to read counts.
        #[arg(long, default_value_t = 1.0)]
        norm_scale: f64,
        /// Records per committed transaction.
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        /// Edit base.
        #[arg(long, default_value_t = 'T')]
        edit_base: char,
        /// Fragment reads are 3' to 5'; templates are always read 5' to 3'.
        #[arg(long)]
        reverse: bool,
        /// 5' primer excluded from the junction-end scan.
        #[arg(long)]
        primer5: Option<String>,
        /// 3' primer excluded from the junction-start scan.
        #[arg(long)]
        primer3: Option<String>,
    },
    /// List genes with a stored template.
    Genes,
    /// Print alignment totals per sample.
    Stats {
        /// Restrict to one gene.
        #[arg(long)]
        gene: Option<String>,
    },
    /// Search alignments with `key=value` query pairs.
    Search {
        /// Query pairs such as `gene=ND7 sample=wt edit_stop=12 limit=20`.
        pairs: Vec<String>,
        /// Print a weighted histogram instead of the matching alignments.
        #[arg(long, value_enum)]
        histogram: Option<HistogramArg>,
    },
    /// Show padded alignments of FASTA fragments against a stored template.
    Show {
        /// Gene name.
        #[arg(long)]
        gene: String,
        /// Fragment FASTA file.
        fasta: PathBuf,
        /// Maximum fragments to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Reads are 3' to 5'.
        #[arg(long)]
        reverse: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum HistogramArg {
    EditStop,
    JuncLen,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Load {
            gene,
            template,
            fragments,
            replicate,
            norm_scale,
            batch_size,
            edit_base,
            reverse,
            primer5,
            primer3,
        } => {
            if !edit_base.is_ascii() {
                bail!("edit base must be an ASCII letter, got {edit_base:?}");
            }
            let config = LoadConfig::default()
                .with_replicate(replicate)
                .with_norm_scale(norm_scale)
                .with_batch_size(batch_size)
                .with_edit_base(edit_base as u8)
                .with_orientation(orientation(reverse))
                .with_primers(primer5, primer3);
            run_load(&cli.db, &gene, &template, &fragments, &config)?
        }
        Commands::Genes => run_genes(&cli.db)?,
        Commands::Stats { gene } => run_stats(&cli.db, gene.as_deref())?,
        Commands::Search { pairs, histogram } => run_search(&cli.db, &pairs, histogram)?,
        Commands::Show {
            gene,
            fasta,
            limit,
            reverse,
        } => run_show(&cli.db, &gene, &fasta, limit, orientation(reverse))?,
    }

    Ok(())
}

fn orientation(reverse: bool) -> Orientation {
    if reverse {
        Orientation::Reverse
    } else {
        Orientation::Forward
    }
}

fn open_fasta(path: &Path) -> Result<fasta::Reader<std::io::BufReader<std::fs::File>>> {
    fasta::Reader::from_file(path).with_context(|| format!("failed to open FASTA file {}", path.display()))
}

fn header(record: &fasta::Record) -> String {
    match record.desc() {
        Some(desc) => format!("{} {}", record.id(), desc),
        None => record.id().to_string(),
    }
}

/// Read a small FASTA file, such as a template, into `(header, sequence)` pairs.
fn read_fasta(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    open_fasta(path)?
        .records()
        .map(|record| -> Result<(String, Vec<u8>)> {
            let record = record.with_context(|| format!("malformed FASTA record in {}", path.display()))?;
            Ok((header(&record), record.seq().to_vec()))
        })
        .collect()
}

/// Stream fragments one record at a time, decomposed with `config`.
fn fragments<'a>(
    path: &Path,
    config: &'a LoadConfig,
) -> Result<impl Iterator<Item = std::io::Result<Fragment>> + 'a> {
    Ok(open_fasta(path)?
        .records()
        .map(move |record| record.map(|r| config.fragment(header(&r), r.seq()))))
}

fn open_store(db: &Path) -> Result<Storage> {
    Storage::open(db).with_context(|| format!("failed to open store {}", db.display()))
}

fn run_load(db: &Path, gene: &str, template: &Path, fragments: &[PathBuf], config: &LoadConfig) -> Result<()> {
    config.validate()?;
    let records = read_fasta(template)?;
    let template = config.template(gene, records)?;

    let mut store = open_store(db)?;
    store.put_template(gene, &template)?;

    for path in fragments {
        let sample = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("cannot derive a sample name from {}", path.display()))?;
        let reads = self::fragments(path, config)?;
        let summary = try_load_sample(&mut store, gene, sample, reads, config, None)
            .with_context(|| format!("failed to load sample {sample} from {}", path.display()))?;
        info!(sample, records = summary.records, batches = summary.batches, "loaded");
    }
    Ok(())
}

fn run_genes(db: &Path) -> Result<()> {
    let store = open_store(db)?;
    for gene in store.genes()? {
        println!("{gene}");
    }
    Ok(())
}

fn run_stats(db: &Path, only: Option<&str>) -> Result<()> {
    let store = open_store(db)?;
    let table = store.gene_table()?;
    if let Some(gene) = only {
        if !table.contains(gene) {
            bail!("gene {gene} not found");
        }
    }

    let rule = "=".repeat(80);
    let thin = "-".repeat(80);
    for (gene, template) in table.iter() {
        if only.map_or(false, |g| g != gene.as_str()) {
            continue;
        }
        let totals = report::sample_totals(&store, gene)?;
        let all = report::grand_total(totals.values());

        println!("{rule}\n{gene}\n{rule}");
        println!("{:>20}{:>11}", "Total Alignments:", all.total);
        println!("{:>20}{:>11}", "Non-Mutant:", all.non_mutant);
        println!("{:>20}{:>11}", "Mutant:", all.mutant());
        println!("{:>20}{:>11}", "Edit Base:", template.edit_base() as char);
        println!("{:>20}{:>11}", "Alt Templates:", template.alt_regions().len());
        println!("{:>20}{:>11}", "Guide RNAs:", template.guides().len());
        println!("{thin}");
        println!("{:<25}{:>11}{:>15}{:>8}{:>11}{:>8}", "Sample", "Total", "Non-Mutant", "%", "Mutant", "%");
        println!("{thin}");
        for (sample, t) in &totals {
            println!(
                "{:<25}{:>11}{:>15}{:>8.2}{:>11}{:>8.2}",
                sample,
                t.total,
                t.non_mutant,
                t.non_mutant_percent(),
                t.mutant(),
                t.mutant_percent()
            );
        }
        println!();
    }
    Ok(())
}

fn run_search(db: &Path, pairs: &[String], histogram: Option<HistogramArg>) -> Result<()> {
    let parsed = pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .with_context(|| format!("query pair '{pair}' is not key=value"))
        })
        .collect::<Result<Vec<_>>>()?;
    let fields = SearchFields::from_pairs(parsed)?;
    let store = open_store(db)?;

    if let Some(arg) = histogram {
        let metric = match arg {
            HistogramArg::EditStop => Metric::EditStop,
            HistogramArg::JuncLen => Metric::JuncLen,
        };
        let hist = report::weighted_histogram(&store, &fields, metric)?;
        let cats = hist.categories();
        println!("sample\t{}", cats.iter().map(u64::to_string).collect::<Vec<_>>().join("\t"));
        for sample in hist.samples.keys() {
            let series = hist.series(sample).unwrap_or_default();
            let cols: Vec<String> = series.iter().map(|v| format!("{v:.2}")).collect();
            println!("{sample}\t{}", cols.join("\t"));
        }
        return Ok(());
    }

    println!("gene\tsample\treplicate\tid\tedit_stop\tjunc_start\tjunc_end\tjunc_len\tread_count\tnorm\thas_mutation\talt_editing");
    let visited = store.search(&fields, |key, aln| {
        let alt = aln.alt_editing.map_or_else(|| "-".to_string(), |a| a.to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.4}\t{}\t{}",
            key.gene,
            key.sample,
            key.replicate,
            key.id,
            aln.edit_stop,
            aln.junc_start,
            aln.junc_end,
            aln.junc_len,
            aln.read_count,
            aln.norm,
            u8::from(aln.has_mutation),
            alt
        );
    })?;
    info!(visited, "search finished");
    Ok(())
}

fn run_show(db: &Path, gene: &str, fasta: &Path, limit: usize, orientation: Orientation) -> Result<()> {
    let store = open_store(db)?;
    let template = store
        .template(gene)?
        .with_context(|| format!("gene {gene} not found"))?;
    let config = LoadConfig::default()
        .with_edit_base(template.edit_base())
        .with_orientation(orientation);

    let mut aligner = NeedlemanWunsch::default();
    for fragment in fragments(fasta, &config)?.take(limit) {
        let fragment = fragment.with_context(|| format!("malformed FASTA record in {}", fasta.display()))?;
        let view = AlignmentView::build(&fragment, &template, &mut aligner)
            .with_context(|| format!("cannot align fragment {}", fragment.name))?;
        let aln = treat::classify_with(&fragment, &template, &mut aligner)?;
        println!(">{} edit_stop={} junc_end={} junc_len={}", fragment.name, aln.edit_stop, aln.junc_end, aln.junc_len);
        println!("{view}\n");
    }
    Ok(())
}

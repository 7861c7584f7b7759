use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdfdelta::{
    format_pdf_date, serialize_object, IncrementalUpdate, ParseOptions, PdfDocument, PdfObject,
    PdfString, XRefEntry,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pdfdelta",
    about = "Inspect PDF files and apply incremental updates",
    version,
    author
)]
struct Cli {
    /// Rebuild the xref table by a linear scan when the declared one is
    /// unusable
    #[arg(long, global = true)]
    repair: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a PDF file's structure
    Info {
        /// Input PDF file
        input: PathBuf,

        /// Also list every cross-reference section
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print one indirect object in PDF syntax
    Object {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: u32,

        /// Generation number
        #[arg(short, long, default_value_t = 0)]
        generation: u16,
    },

    /// Rewrite the document information dictionary via an incremental update
    SetInfo {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// Document author
        #[arg(long)]
        author: Option<String>,

        /// Document subject
        #[arg(long)]
        subject: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = if cli.repair {
        ParseOptions::repair()
    } else {
        ParseOptions::default()
    };

    match cli.command {
        Commands::Info { input, detailed } => info(&input, options, detailed),
        Commands::Object {
            input,
            number,
            generation,
        } => print_object(&input, options, number, generation),
        Commands::SetInfo {
            input,
            output,
            title,
            author,
            subject,
        } => set_info(&input, &output, options, title, author, subject),
    }
}

fn open(input: &PathBuf, options: ParseOptions) -> Result<PdfDocument> {
    PdfDocument::open_with_options(input, options)
        .with_context(|| format!("failed to parse {}", input.display()))
}

fn info(input: &PathBuf, options: ParseOptions, detailed: bool) -> Result<()> {
    let doc = open(input, options)?;

    println!("File:      {}", input.display());
    println!("Version:   PDF {}", doc.version());
    println!("Size:      {} bytes", doc.buffer().len());
    println!("Pages:     {}", doc.page_count()?);
    println!("Objects:   {}", doc.xref().len());
    println!("Updates:   {}", doc.xref().sections().len().saturating_sub(1));

    let trailer = doc.trailer()?;
    let (num, gen) = trailer.root()?;
    println!("Root:      {num} {gen} R");
    if let Some((num, gen)) = trailer.info() {
        println!("Info:      {num} {gen} R");
    }
    if trailer.is_encrypted() {
        println!("Encrypted: yes");
    }

    if let Some(info) = doc.info()? {
        for key in ["Title", "Author", "Subject", "Producer", "ModDate"] {
            if let Some(value) = info.get(key).and_then(PdfObject::as_string) {
                println!("{key:<10} {}", String::from_utf8_lossy(value.as_bytes()));
            }
        }
    }

    if detailed {
        println!();
        for (i, section) in doc.xref().sections().iter().enumerate() {
            println!(
                "section {i}: {:?} at offset {} with {} entries",
                section.kind,
                section.offset,
                section.entries.len()
            );
        }

        let mut free = 0usize;
        let mut compressed = 0usize;
        for (_, entry) in doc.xref().iter() {
            match entry {
                XRefEntry::Free { .. } => free += 1,
                XRefEntry::Compressed { .. } => compressed += 1,
                XRefEntry::InUse { .. } => {}
            }
        }
        println!("free entries:       {free}");
        println!("compressed entries: {compressed}");
    }

    Ok(())
}

fn print_object(input: &PathBuf, options: ParseOptions, number: u32, generation: u16) -> Result<()> {
    let doc = open(input, options)?;
    let obj = doc
        .get_object(number, generation)
        .with_context(|| format!("failed to resolve {number} {generation} R"))?;

    println!("{number} {generation} obj");
    println!("{}", String::from_utf8_lossy(&serialize_object(&obj)));
    println!("endobj");
    Ok(())
}

fn set_info(
    input: &PathBuf,
    output: &PathBuf,
    options: ParseOptions,
    title: Option<String>,
    author: Option<String>,
    subject: Option<String>,
) -> Result<()> {
    let doc = open(input, options)?;

    let mut info = doc.info()?.unwrap_or_default();
    for (key, value) in [("Title", title), ("Author", author), ("Subject", subject)] {
        if let Some(value) = value {
            info.insert(key, PdfObject::String(PdfString::new(value.into_bytes())));
        }
    }
    info.insert(
        "ModDate",
        PdfObject::String(PdfString::new(format_pdf_date(Utc::now()).into_bytes())),
    );

    let mut update = IncrementalUpdate::new(&doc);
    match doc.trailer()?.info() {
        Some((num, _)) => update.set_object(num, &PdfObject::Dictionary(info)),
        None => {
            let num = update.add_object(&PdfObject::Dictionary(info));
            update.set_info_reference(num, 0);
        }
    }

    let updated = update.write_to_vec()?;
    std::fs::write(output, &updated)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "wrote {} ({} bytes, {} appended)",
        output.display(),
        updated.len(),
        updated.len() - doc.buffer().len()
    );
    Ok(())
}

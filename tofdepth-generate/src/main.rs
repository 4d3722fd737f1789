mod stopping;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tofdepth::IsotopeTable;
use tofdepth_data::IsotopeBundle;

#[derive(Parser)]
#[command(name = "tofdepth-generate")]
#[command(about = "Prepares data files for tofdepth", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a mass table into a postcard + zstd bundle
    Masses {
        /// Mass table (`N Z A Symbol Mass[µu] Abundance[%]`)
        input: PathBuf,
        /// Bundle to write
        output: PathBuf,
    },
    /// Rewrite an ASCII stopping file in the binary format
    BinaryStopping { input: PathBuf, output: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Masses { input, output } => pack_masses(&input, &output),
        Commands::BinaryStopping { input, output } => {
            let values = stopping::convert_to_binary(&input, &output);
            println!("Wrote {values} values to {:?}", output);
        }
    }
}

fn pack_masses(input: &Path, output: &Path) {
    println!("Parsing mass table {:?}...", input);
    let table = IsotopeTable::load(input).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    });
    println!("  Isotopes: {} entries", table.len());

    let source = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bundle = table.to_bundle(&source);

    println!("\nSerializing with postcard...");
    let serialized = postcard::to_allocvec(&bundle).expect("postcard serialization failed");
    println!("  Serialized size: {} bytes", serialized.len());

    println!("Compressing with zstd (level 19)...");
    let compressed = zstd::encode_all(&serialized[..], 19).expect("zstd compression failed");
    println!(
        "  Compressed size: {} bytes, ratio {:.1}x",
        compressed.len(),
        serialized.len() as f64 / compressed.len() as f64
    );

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).expect("failed to create output directory");
    }
    let mut f = std::fs::File::create(output).expect("failed to create output file");
    f.write_all(&compressed)
        .expect("failed to write compressed data");
    println!("\nWrote {:?}", output);

    println!("Verifying round-trip deserialization...");
    let decompressed = zstd::decode_all(&compressed[..]).expect("zstd decompression failed");
    assert_eq!(decompressed.len(), serialized.len());
    let unpacked: IsotopeBundle =
        postcard::from_bytes(&decompressed).expect("postcard deserialization failed");
    assert_eq!(unpacked.isotopes, bundle.isotopes);
    let reread = IsotopeTable::from_compressed(&compressed).expect("bundle not readable by tofdepth");
    assert_eq!(reread.len(), table.len());
    println!("  Round-trip OK!");
}

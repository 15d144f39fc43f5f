// espmak/src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use espmak::error::{Error, Result};
use espmak::fs_tree::{FsTree, ROOT};
use espmak::{create_boot_image, Options};

/// EFI boot disk image creator.
///
/// Produces a single-partition GPT disk image whose EFI System Partition is
/// formatted FAT16 or FAT32 and populated from a directory tree or a single
/// BOOTX64.EFI payload.
#[derive(Debug, Parser)]
#[command(name = "espmak", version)]
struct Cli {
    /// Source kernel binary, must be named BOOTX64.EFI; creates the
    /// standard EFI/BOOT/BOOTX64.EFI layout
    #[arg(short = 'b', long = "bootimage", conflicts_with = "directory")]
    bootimage: Option<PathBuf>,

    /// Source directory to copy to the disk image
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,

    /// Output disk image file
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Volume label
    #[arg(short = 'l', long = "label", default_value = "NOLABEL")]
    label: String,

    /// Preserve source file name cases instead of converting to upper case
    #[arg(short = 'c', long = "preserve-case")]
    preserve_case: bool,

    /// Re-use an existing output image if it is large enough
    #[arg(short = 'f', long = "reformat")]
    reformat: bool,

    /// Output more information about the build process
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

const BOOT_PAYLOAD_NAME: &str = "BOOTX64.EFI";

fn build_tree(cli: &Cli, options: &Options) -> Result<FsTree> {
    if let Some(directory) = &cli.directory {
        return FsTree::create_from_source(directory, options);
    }

    if let Some(bootimage) = &cli.bootimage {
        let name = bootimage
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "boot image path {} has no file name",
                    bootimage.display()
                ))
            })?;
        if !name.eq_ignore_ascii_case(BOOT_PAYLOAD_NAME) {
            return Err(Error::invalid_argument(format!(
                "boot image must be named {}, got \"{}\"",
                BOOT_PAYLOAD_NAME, name
            )));
        }
        let payload = std::fs::read(bootimage).map_err(|e| {
            Error::unavailable(format!(
                "cannot read boot image {}: {}",
                bootimage.display(),
                e
            ))
        })?;

        let mut tree = FsTree::new(options);
        let efi = tree.create_directory(ROOT, "EFI")?;
        let boot = tree.create_directory(efi, "BOOT")?;
        tree.create_file(boot, BOOT_PAYLOAD_NAME, payload)?;
        return Ok(tree);
    }

    // neither -b nor -d: an empty volume with just the label entry
    Ok(FsTree::new(options))
}

fn run(cli: &Cli, options: &Options) -> Result<()> {
    let mut tree = build_tree(cli, options)?;
    tree.dump_contents();
    create_boot_image(&cli.output, &mut tree, &cli.label, options)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    let options = Options {
        verbose: cli.verbose,
        preserve_case: cli.preserve_case,
        reformat: cli.reformat,
    };

    match run(&cli, &options) {
        Ok(()) => {
            println!("boot image created");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("espmak: {}", err);
            ExitCode::FAILURE
        }
    }
}

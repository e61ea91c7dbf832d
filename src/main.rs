use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dng_negative::image_pipeline::{
    AutoReader, DngCompression, DngPipeline, Host, HostConfig, StandardTiffWriter, WriterConfig,
};
use dng_negative::logger;

use tracing::info;

/// Converts a camera raw or DNG file into a DNG (raw or linear) or a TIFF.
#[derive(Parser)]
#[command(name = "dng_negative", version)]
struct Cli {
    /// Raw or DNG file to read
    input: PathBuf,

    /// File to write
    output: PathBuf,

    /// Save a demosaiced linear DNG instead of the raw mosaic
    #[arg(long)]
    linear: bool,

    /// Export the rendered image as a 16-bit TIFF
    #[arg(long)]
    tiff: bool,

    /// Store DNG image data without lossless JPEG compression
    #[arg(long)]
    uncompressed: bool,

    /// Write the DNG image as a single strip instead of tiles
    #[arg(long)]
    strip: bool,
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();

    info!("Starting dng_negative {}", env!("CARGO_PKG_VERSION"));

    let host_config = HostConfig::builder().save_linear_dng(cli.linear).build();
    let mut writer_config = WriterConfig::builder();
    if cli.uncompressed {
        writer_config = writer_config.compression(DngCompression::None);
    }
    if cli.strip {
        writer_config = writer_config.tile_size(None);
    }
    let writer_config = writer_config.build();

    let timings = if cli.tiff {
        DngPipeline::with_custom(AutoReader, StandardTiffWriter, Host::new(host_config), writer_config)
            .convert_file_with_timings(&cli.input, &cli.output)
    } else {
        DngPipeline::new(host_config, writer_config)
            .convert_file_with_timings(&cli.input, &cli.output)
    }
    .with_context(|| format!("converting {}", cli.input.display()))?;

    timings.log_summary();
    info!("Wrote {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_and_paths_parse() {
        let cli = Cli::try_parse_from([
            "dng_negative",
            "in.arw",
            "out.dng",
            "--linear",
            "--strip",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("in.arw"));
        assert_eq!(cli.output, PathBuf::from("out.dng"));
        assert!(cli.linear && cli.strip);
        assert!(!cli.tiff && !cli.uncompressed);
    }

    #[test]
    fn missing_output_and_unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["dng_negative", "in.arw"]).is_err());
        assert!(Cli::try_parse_from(["dng_negative", "a", "b", "--fast"]).is_err());
    }
}

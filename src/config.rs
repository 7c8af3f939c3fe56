use crate::stages::fetch::FetchOptions;
use crate::stages::normalize::NormalizeOptions;
use crate::stages::CleanupPolicy;
use crate::utils::files::NamingRule;
use crate::Args;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Everything one run needs, validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub links_file: PathBuf,
    pub log_file: PathBuf,
    pub out_dir: PathBuf,
    pub fetch: FetchOptions,
    pub decoder: PathBuf,
    pub cleanup: CleanupPolicy,
    pub normalize: NormalizeOptions,
    pub report: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        require_dir(&args.out_dir, "Output directory")?;
        if let Some(dir) = &args.final_dir {
            require_dir(dir, "Final directory")?;
        }
        if args.dim == 0 {
            bail!("--dim must be greater than 0");
        }
        if args.concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        if args.jobs == 0 {
            bail!("--jobs must be at least 1");
        }

        let cleanup = if args.legacy_cleanup {
            CleanupPolicy::Unconditional
        } else {
            CleanupPolicy::Verified
        };
        let naming = match args.replace_last_char {
            Some(c) => NamingRule::ReplaceLast(c),
            None => NamingRule::Verbatim,
        };

        Ok(Self {
            fetch: FetchOptions {
                naming,
                concurrency: args.concurrency,
                final_dir: args.final_dir.clone(),
            },
            normalize: NormalizeOptions {
                dim: args.dim,
                unlimited_pixels: !args.pixel_limits,
                greyscale: args.greyscale,
                final_dir: args.final_dir,
                cleanup,
                jobs: args.jobs,
            },
            links_file: args.links_file,
            log_file: args.log_file,
            out_dir: args.out_dir,
            decoder: args.decoder,
            cleanup,
            report: args.report,
        })
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{} '{}' does not exist or is not a directory", what, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str], out_dir: &Path) -> Result<PipelineConfig> {
        let out = out_dir.to_str().unwrap();
        let mut argv = vec!["newsprint-fetch", "links.txt", "run.log", out];
        argv.extend_from_slice(extra);
        PipelineConfig::from_args(Args::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_are_sequential_with_verified_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse(&[], dir.path()).unwrap();

        assert_eq!(config.fetch.naming, NamingRule::Verbatim);
        assert_eq!(config.fetch.concurrency, 1);
        assert_eq!(config.normalize.dim, 1024);
        assert!(config.normalize.unlimited_pixels);
        assert_eq!(config.normalize.jobs, 1);
        assert_eq!(config.cleanup, CleanupPolicy::Verified);
        assert_eq!(config.decoder, PathBuf::from("opj_decompress"));
    }

    #[test]
    fn flags_map_onto_stage_options() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse(
            &[
                "--dim",
                "512",
                "--legacy-cleanup",
                "--replace-last-char",
                "g",
                "--pixel-limits",
                "--greyscale",
            ],
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.normalize.dim, 512);
        assert_eq!(config.cleanup, CleanupPolicy::Unconditional);
        assert_eq!(config.normalize.cleanup, CleanupPolicy::Unconditional);
        assert_eq!(config.fetch.naming, NamingRule::ReplaceLast('g'));
        assert!(!config.normalize.unlimited_pixels);
        assert!(config.normalize.greyscale);
    }

    #[test]
    fn missing_output_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = parse(&[], &missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "got: {err}");
    }

    #[test]
    fn zero_dim_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse(&["--dim", "0"], dir.path()).is_err());
    }

    #[test]
    fn wrong_arity_fails_to_parse() {
        assert!(Args::try_parse_from(["newsprint-fetch", "links.txt", "run.log"]).is_err());
        assert!(Args::try_parse_from(["newsprint-fetch", "a", "b", "c", "d"]).is_err());
    }
}

// Plain-text persistence of run results
//
// Summary log: one "<runId> <doseInGray>" line per run, append only.
// Depth profile: one "<depthInMillimeters> <energyInMeV>" line per bin.

use crate::config::{OutputConfig, ProfilePolicy};
use crate::error::{Result, ScoringError};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes run summaries and depth profiles to disk
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output: OutputConfig,
}

impl ResultWriter {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    pub fn summary_path(&self) -> &Path {
        &self.output.summary_path
    }

    pub fn policy(&self) -> ProfilePolicy {
        self.output.profile_policy
    }

    /// Profile file a run writes to, or `None` when profiles are disabled
    pub fn profile_path_for(&self, run_id: u32) -> Option<PathBuf> {
        let base = &self.output.profile_path;
        match self.output.profile_policy {
            ProfilePolicy::Disabled => None,
            ProfilePolicy::Overwrite => Some(base.clone()),
            ProfilePolicy::PerRun => {
                let stem = base
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "depth_profile".to_string());
                let name = match base.extension() {
                    Some(ext) => format!("{}_run{}.{}", stem, run_id, ext.to_string_lossy()),
                    None => format!("{}_run{}", stem, run_id),
                };
                Some(base.with_file_name(name))
            }
        }
    }

    /// Append one summary line for a run.
    ///
    /// The log is opened in append mode so earlier runs are never truncated.
    pub fn append_run_summary(&self, run_id: u32, dose: f64, event_count: u64) -> Result<()> {
        let path = &self.output.summary_path;
        ensure_parent(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ScoringError::io(path, e))?;
        // single write so a failure cannot leave half a line behind a good one
        let line = format!("{} {:.6}\n", run_id, dose);
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ScoringError::io(path, e))?;
        debug!(
            "Appended run {} summary ({} events) to {}",
            run_id,
            event_count,
            path.display()
        );
        Ok(())
    }

    /// Write the depth profile table of a run according to the profile policy.
    ///
    /// # Returns
    /// The path written, or `None` if profiles are disabled
    pub fn write_depth_profile(&self, run_id: u32, table: &[(f64, f64)]) -> Result<Option<PathBuf>> {
        let Some(path) = self.profile_path_for(run_id) else {
            return Ok(None);
        };
        ensure_parent(&path)?;

        // write beside the target and rename, so the previous profile survives a failed write
        let tmp_path = path.with_extension("tmp");
        if let Err(e) = write_table(&tmp_path, table) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &path).map_err(|e| ScoringError::io(&path, e))?;
        debug!("Wrote {} depth bins to {}", table.len(), path.display());
        Ok(Some(path))
    }
}

fn write_table(path: &Path, table: &[(f64, f64)]) -> Result<()> {
    let file = File::create(path).map_err(|e| ScoringError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (depth, energy) in table {
        writeln!(writer, "{:.6} {:.6}", depth, energy).map_err(|e| ScoringError::io(path, e))?;
    }
    writer.flush().map_err(|e| ScoringError::io(path, e))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ScoringError::io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer_in(dir: &TempDir, policy: ProfilePolicy) -> ResultWriter {
        ResultWriter::new(OutputConfig {
            summary_path: dir.path().join("dose_output.txt"),
            profile_path: dir.path().join("depth_profile.txt"),
            profile_policy: policy,
        })
    }

    #[test]
    fn test_summary_lines_are_appended() {
        let tmp = TempDir::new().unwrap();
        let writer = writer_in(&tmp, ProfilePolicy::Overwrite);

        writer.append_run_summary(0, 2.0, 1000).unwrap();
        writer.append_run_summary(1, 66.666666666, 15).unwrap();

        let text = fs::read_to_string(writer.summary_path()).unwrap();
        assert_eq!(text, "0 2.000000\n1 66.666667\n");
    }

    #[test]
    fn test_profile_overwrite() {
        let tmp = TempDir::new().unwrap();
        let writer = writer_in(&tmp, ProfilePolicy::Overwrite);

        writer.write_depth_profile(0, &[(0.5, 1.0), (1.5, 2.0)]).unwrap();
        let path = writer
            .write_depth_profile(1, &[(0.5, 3.0)])
            .unwrap()
            .unwrap();

        assert_eq!(path, tmp.path().join("depth_profile.txt"));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0.500000 3.000000\n");
        assert!(!tmp.path().join("depth_profile.tmp").exists());
    }

    #[test]
    fn test_profile_per_run() {
        let tmp = TempDir::new().unwrap();
        let writer = writer_in(&tmp, ProfilePolicy::PerRun);

        writer.write_depth_profile(3, &[(0.5, 1.0)]).unwrap();
        writer.write_depth_profile(4, &[(0.5, 2.0)]).unwrap();

        assert!(tmp.path().join("depth_profile_run3.txt").exists());
        assert!(tmp.path().join("depth_profile_run4.txt").exists());
        assert!(!tmp.path().join("depth_profile.txt").exists());
    }

    #[test]
    fn test_profile_disabled() {
        let tmp = TempDir::new().unwrap();
        let writer = writer_in(&tmp, ProfilePolicy::Disabled);
        assert_eq!(writer.write_depth_profile(0, &[(0.5, 1.0)]).unwrap(), None);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let writer = ResultWriter::new(OutputConfig {
            summary_path: tmp.path().join("results/summary/dose.txt"),
            profile_path: tmp.path().join("results/profiles/depth.dat"),
            profile_policy: ProfilePolicy::PerRun,
        });
        writer.append_run_summary(2, 1.0, 1).unwrap();
        let path = writer.write_depth_profile(2, &[(1.0, 1.0)]).unwrap().unwrap();
        assert_eq!(path, tmp.path().join("results/profiles/depth_run2.dat"));
        assert!(writer.summary_path().exists());
    }

    #[test]
    fn test_summary_failure_is_io_error() {
        let tmp = TempDir::new().unwrap();
        // a directory where the log file should be
        let blocked = tmp.path().join("dose_output.txt");
        fs::create_dir(&blocked).unwrap();
        let writer = writer_in(&tmp, ProfilePolicy::Overwrite);

        let err = writer.append_run_summary(0, 1.0, 1).unwrap_err();
        assert!(matches!(err, ScoringError::Io { .. }));
    }
}

//! Reading configuration and event files, writing results.

use crate::Result;
use l3trig_core::{EventHits, TriggerConfig};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Loads a JSON configuration, or the standard one when `path` is `None`.
///
/// Missing sections and fields take their default values. The result is
/// validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<TriggerConfig> {
    let config = match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            serde_json::from_reader(reader)?
        }
        None => TriggerConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Reads a JSON array of events.
pub fn read_events(path: &Path) -> Result<Vec<EventHits>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Writes `value` as pretty JSON to `path`, or to stdout when `path` is `None`.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CliError;
    use l3trig_core::{CrystalHit, WireHit};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config, TriggerConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let file = file_with(r#"{ "clustering": { "seed_threshold": 0.25 }, "tracking": { "min_pt": 0.2 } }"#);
        let config = load_config(Some(file.path())).unwrap();
        assert!((config.clustering.seed_threshold - 0.25).abs() < 1e-12);
        assert!((config.tracking.min_pt - 0.2).abs() < 1e-12);
        assert_eq!(config.chamber, TriggerConfig::default().chamber);
        assert_eq!(config.calorimeter.rings.len(), 69);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let file = file_with(r#"{ "calorimeter": { "rings": [] } }"#);
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::Core(_)), "{err}");
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let file = file_with("{ not json");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::Json(_)), "{err}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_events(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CliError::Io(_)), "{err}");
    }

    #[test]
    fn test_events_round_trip_through_file() {
        let mut event = EventHits::new(7);
        event.wire_hits.push(WireHit::new(3, 12, 85.0));
        event.crystal_hits.push(CrystalHit::new(4000, 0.8));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        write_json(&[event.clone()], Some(&path)).unwrap();
        let events = read_events(&path).unwrap();
        assert_eq!(events, vec![event]);
    }
}

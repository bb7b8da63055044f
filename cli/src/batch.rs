//! Batch tracking of detector CSV files: one pipeline per file, traffic counts
//! through the hive entrance, appended run statistics.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};
use tracker_core::{
    traffic::{EntranceEllipse, MinTrackFilter, TrafficCounts},
    track_detections, Detection, FrameIndex, PipelineConfig, TrackingRun,
};

pub const STATS_CSV: &str = "track-stats.csv";
pub const STATS_TXT: &str = "track-stats.txt";

/// Files with fewer records or a shorter frame span than this carry no data.
const MIN_RECORDS: usize = 5;
const MIN_FRAME_SPAN: u64 = 5;

const REQUIRED_COLUMNS: [&str; 3] = ["video_frame_id", "center_x", "center_y"];

/// One row of a detector CSV. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct DetectionRecord {
    video_frame_id: FrameIndex,
    center_x: f64,
    center_y: f64,
}

/// Entrance ellipses keyed by `YYYYMMDD` recording date.
pub type EllipseTable = BTreeMap<String, EntranceEllipse>;

pub fn load_ellipses(path: &Path) -> Result<EllipseTable> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading ellipses file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing ellipses file {}", path.display()))
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

fn date_pattern() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"[0-9]{8}").expect("date pattern is valid"))
}

fn time_pattern() -> &'static Regex {
    static TIME: OnceLock<Regex> = OnceLock::new();
    TIME.get_or_init(|| Regex::new(r"[0-9]{6}").expect("time pattern is valid"))
}

/// Recording date (`YYYYMMDD`) embedded in a file name.
pub fn date_from_filename(name: &str) -> Option<&str> {
    date_pattern().find(name).map(|m| m.as_str())
}

/// Recording time (`HHMMSS`) embedded in a file name after its date.
pub fn time_from_filename(name: &str) -> Option<&str> {
    let date = date_pattern().find(name)?;
    time_pattern().find_at(name, date.end()).map(|m| m.as_str())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// CSV inputs under `input` (a file or a folder), newest recording first.
pub fn discover_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = if input.is_dir() {
        fs::read_dir(input)
            .with_context(|| format!("listing {}", input.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect()
    } else {
        vec![input.to_path_buf()]
    };
    files.sort_by(|a, b| {
        let (a, b) = (file_name(a), file_name(b));
        let key = |n: &str| {
            (
                date_from_filename(n).map(str::to_owned),
                time_from_filename(n).map(str::to_owned),
            )
        };
        key(&b).cmp(&key(&a)).then_with(|| a.cmp(&b))
    });
    Ok(files)
}

/// File names already recorded in `track-stats.csv`.
pub fn already_processed(output: &Path) -> Result<BTreeSet<String>> {
    let path = output.join(STATS_CSV);
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut done = BTreeSet::new();
    for record in reader.records() {
        if let Some(name) = record?.get(0) {
            done.insert(name.to_owned());
        }
    }
    Ok(done)
}

// ---------------------------------------------------------------------------
// Per-file tracking
// ---------------------------------------------------------------------------

/// Detections of one file, or why the file has nothing to track.
pub enum Loaded {
    Detections(Vec<Detection>),
    NoData(String),
}

/// Read a detector CSV. Rows are ordered by frame (stable, so within-frame
/// order is preserved) before tracking.
pub fn load_detections(path: &Path) -> Result<Loaded> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = reader.headers()?.clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|c| !headers.iter().any(|h| h == **c))
    {
        return Ok(Loaded::NoData(format!("missing column {missing}")));
    }

    let mut detections = Vec::new();
    for (row, record) in reader.deserialize::<DetectionRecord>().enumerate() {
        match record {
            Ok(r) => detections.push(Detection::new(r.video_frame_id, r.center_x, r.center_y)),
            Err(err) => warn!(file = %path.display(), row, "skipping unreadable row: {err}"),
        }
    }

    if detections.len() < MIN_RECORDS {
        return Ok(Loaded::NoData(format!("{} records", detections.len())));
    }
    let first = detections.iter().map(|d| d.frame).min().unwrap_or(0);
    let last = detections.iter().map(|d| d.frame).max().unwrap_or(0);
    if last - first < MIN_FRAME_SPAN {
        return Ok(Loaded::NoData(format!("frames {first}..={last}")));
    }

    detections.sort_by_key(|d| d.frame);
    Ok(Loaded::Detections(detections))
}

/// Result of tracking one file.
pub struct FileReport {
    pub name: String,
    pub records: usize,
    pub first_frame: FrameIndex,
    pub last_frame: FrameIndex,
    pub date: Option<String>,
    /// Significant tracks only
    pub tracks: usize,
    pub counts: TrafficCounts,
    pub run: TrackingRun,
}

pub enum Outcome {
    Tracked(FileReport),
    NoData { name: String, reason: String },
}

/// Track one file and count its traffic through `entrance`.
pub fn track_file(
    path: &Path,
    config: &PipelineConfig,
    significance: &MinTrackFilter,
    entrance: Option<&EntranceEllipse>,
) -> Result<Outcome> {
    let name = file_name(path);
    let detections = match load_detections(path)? {
        Loaded::Detections(d) => d,
        Loaded::NoData(reason) => return Ok(Outcome::NoData { name, reason }),
    };
    let records = detections.len();
    let first_frame = detections.first().map_or(0, |d| d.frame);
    let last_frame = detections.last().map_or(0, |d| d.frame);

    let run = track_detections(config.clone(), detections)
        .with_context(|| format!("tracking {name}"))?;
    let significant = significance.apply(&run.summaries);
    let counts = entrance
        .map(|e| TrafficCounts::count(e, &significant))
        .unwrap_or_default();

    info!(
        file = %name,
        records,
        tracks = significant.len(),
        enter = counts.enter,
        exit = counts.exit,
        "file tracked"
    );

    Ok(Outcome::Tracked(FileReport {
        date: date_from_filename(&name).map(str::to_owned),
        name,
        records,
        first_frame,
        last_frame,
        tracks: significant.len(),
        counts,
        run,
    }))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Write a file's track history to `<output>/<stem>-tracks.csv`.
pub fn write_history(output: &Path, report: &FileReport) -> Result<PathBuf> {
    let stem = Path::new(&report.name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| report.name.clone());
    let path = output.join(format!("{stem}-tracks.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    for entry in &report.run.history {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(path)
}

fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

const RULE: &str = "-------------------------------------------------";

/// Append one file's row to `track-stats.csv` and its block to `track-stats.txt`.
pub fn append_stats(output: &Path, outcome: &Outcome, config: &PipelineConfig) -> Result<()> {
    let (row, block) = match outcome {
        Outcome::NoData { name, .. } => (
            format!("{name},0,0,0,0,0,0\n"),
            format!("{RULE}\nCSV File: {name}. No Data Found\n{RULE}\n"),
        ),
        Outcome::Tracked(r) => {
            let c = &r.counts;
            (
                format!(
                    "{},{},{},{},{},{},{}\n",
                    r.name, r.records, r.tracks, c.enter, c.exit, c.inside, c.outside
                ),
                format!(
                    "{RULE}\n\
                     CSV File: {}. Total Records: {}. Date: {}\n\
                     Start Frame: {}. End Frame: {}\n\
                     Distance Threshold: {}. Max Frames Before Death: {}\n\
                     Total Tracks: {}\n\
                     Enter: {}. Exit: {}. Inside: {}. Outside: {}\n\
                     {RULE}\n",
                    r.name,
                    r.records,
                    r.date.as_deref().unwrap_or("unknown"),
                    r.first_frame,
                    r.last_frame,
                    config.max_match_distance,
                    config.lifecycle.max_misses,
                    r.tracks,
                    c.enter,
                    c.exit,
                    c.inside,
                    c.outside,
                ),
            )
        }
    };
    append(&output.join(STATS_CSV), &row)?;
    append(&output.join(STATS_TXT), &block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beetrack-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn dates_and_times_from_names() {
        let name = "cam_2_20230612_093015_detections.csv";
        assert_eq!(date_from_filename(name), Some("20230612"));
        assert_eq!(time_from_filename(name), Some("093015"));
        assert_eq!(date_from_filename("bees.csv"), None);
        assert_eq!(time_from_filename("cam_20230612.csv"), None);
        // Time directly follows the date, and a time-like run before it is skipped
        let name = "093015_hive_20230612101500.csv";
        assert_eq!(date_from_filename(name), Some("20230612"));
        assert_eq!(time_from_filename(name), Some("101500"));
    }

    #[test]
    fn inputs_are_newest_first() {
        let dir = scratch("discover");
        for n in [
            "hive_20230611_120000.csv",
            "hive_20230612_080000.csv",
            "hive_20230612_170000.csv",
            "notes.txt",
        ] {
            fs::write(dir.join(n), "").unwrap();
        }
        let names: Vec<String> = discover_inputs(&dir)
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(
            names,
            vec![
                "hive_20230612_170000.csv",
                "hive_20230612_080000.csv",
                "hive_20230611_120000.csv",
            ]
        );
    }

    #[test]
    fn short_or_malformed_files_have_no_data() {
        let dir = scratch("nodata");
        let few = dir.join("few.csv");
        fs::write(&few, "video_frame_id,center_x,center_y\n0,1,1\n1,2,2\n").unwrap();
        assert!(matches!(load_detections(&few).unwrap(), Loaded::NoData(_)));

        let narrow = dir.join("narrow.csv");
        let rows: String = (0..10).map(|i| format!("{},{i},0\n", i % 3)).collect();
        fs::write(&narrow, format!("video_frame_id,center_x,center_y\n{rows}")).unwrap();
        assert!(matches!(load_detections(&narrow).unwrap(), Loaded::NoData(_)));

        let wrong = dir.join("wrong.csv");
        fs::write(&wrong, "frame,x,y\n0,1,1\n").unwrap();
        assert!(matches!(load_detections(&wrong).unwrap(), Loaded::NoData(_)));
    }

    #[test]
    fn headers_are_trimmed_and_rows_ordered() {
        let dir = scratch("trim");
        let path = dir.join("hive_20230612_080000.csv");
        let rows: String = [7, 0, 3, 1, 2, 5]
            .iter()
            .map(|f| format!("{f}, {}.0 , 10.0, 0.9\n", f * 4))
            .collect();
        fs::write(&path, format!(" video_frame_id , center_x,center_y, confidence\n{rows}")).unwrap();
        let Loaded::Detections(dets) = load_detections(&path).unwrap() else {
            panic!("expected detections");
        };
        let frames: Vec<FrameIndex> = dets.iter().map(|d| d.frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 5, 7]);
        assert_eq!(dets[1].x, 4.0);
    }

    #[test]
    fn stats_rows_accumulate_and_mark_files_done() {
        let dir = scratch("stats");
        let path = dir.join("hive_20230612_080000.csv");
        // Zig-zag flight so the summed prediction error clears the significance bar
        let rows: String = (0..30)
            .map(|f| format!("{f},{},{}\n", 20 * f, 300 + 12 * (f % 2)))
            .collect();
        fs::write(&path, format!("video_frame_id,center_x,center_y\n{rows}")).unwrap();

        let config = PipelineConfig::default();
        let entrance = EntranceEllipse {
            center: (300.0, 300.0),
            axes: (200.0, 100.0),
            angle_deg: 0.0,
        };
        let outcome = track_file(&path, &config, &MinTrackFilter::default(), Some(&entrance)).unwrap();
        let Outcome::Tracked(report) = &outcome else {
            panic!("expected a tracked file");
        };
        assert_eq!(report.records, 30);
        assert_eq!(report.tracks, 1);
        // Starts left of the ellipse, ends right of it
        assert_eq!(report.counts.outside, 1);

        append_stats(&dir, &outcome, &config).unwrap();
        append_stats(
            &dir,
            &Outcome::NoData {
                name: "empty.csv".into(),
                reason: "0 records".into(),
            },
            &config,
        )
        .unwrap();
        let csv = fs::read_to_string(dir.join(STATS_CSV)).unwrap();
        assert_eq!(csv, "hive_20230612_080000.csv,30,1,0,0,0,1\nempty.csv,0,0,0,0,0,0\n");
        let done = already_processed(&dir).unwrap();
        assert!(done.contains("hive_20230612_080000.csv") && done.contains("empty.csv"));

        let written = write_history(&dir, report).unwrap();
        let table = fs::read_to_string(written).unwrap();
        assert!(table.starts_with("frame_index,track_id,x,y,status\n"));
        assert_eq!(table.lines().count(), 31);
    }
}

//! Readers for the two batch inputs: the segmentation raster and the
//! localization table.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use maskcore::data::point::Point;
use maskcore::data::raster::MaskRaster;
use ndarray::Array2;
use ndarray_npy::{NpzReader, ReadNpyExt, ReadableElement};

use crate::error::{PipelineError, PipelineResult};

/// Name of the label array inside a segmentation archive.
pub const MASKS_KEY: &str = "masks";

/// Column naming conventions accepted for point tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateNaming {
    /// `position_x [nm]`, `position_y [nm]`
    PhysicalUnits,
    /// `position_x`, `position_y`
    Plain,
}

impl CoordinateNaming {
    pub fn x_column(&self) -> &'static str {
        match self {
            CoordinateNaming::PhysicalUnits => "position_x [nm]",
            CoordinateNaming::Plain => "position_x",
        }
    }

    pub fn y_column(&self) -> &'static str {
        match self {
            CoordinateNaming::PhysicalUnits => "position_y [nm]",
            CoordinateNaming::Plain => "position_y",
        }
    }
}

pub const CHANNEL_COLUMN: &str = "channel";

/// Resolved column positions of a point table header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointColumns {
    pub naming: CoordinateNaming,
    pub x: usize,
    pub y: usize,
    pub channel: usize,
}

impl PointColumns {
    /// Finds the coordinate and channel columns, preferring the
    /// physical-unit naming when both are present.
    pub fn resolve(headers: &StringRecord) -> Result<Self, String> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let (naming, x, y) = [CoordinateNaming::PhysicalUnits, CoordinateNaming::Plain]
            .into_iter()
            .find_map(|n| Some((n, position(n.x_column())?, position(n.y_column())?)))
            .ok_or_else(|| {
                "expected 'position_x [nm]'/'position_y [nm]' or 'position_x'/'position_y' columns".to_string()
            })?;

        let channel = position(CHANNEL_COLUMN).ok_or_else(|| format!("missing '{}' column", CHANNEL_COLUMN))?;

        Ok(PointColumns { naming, x, y, channel })
    }

    pub fn parse(&self, record: &StringRecord) -> Result<Point, String> {
        let field = |idx: usize, name: &str| {
            record.get(idx).ok_or_else(|| format!("missing value for '{}'", name))
        };

        let x = parse_coordinate(field(self.x, self.naming.x_column())?, self.naming.x_column())?;
        let y = parse_coordinate(field(self.y, self.naming.y_column())?, self.naming.y_column())?;
        let channel = parse_channel(field(self.channel, CHANNEL_COLUMN)?)?;

        Ok(Point::new(x, y, channel))
    }
}

fn parse_coordinate(value: &str, name: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number in column '{}'", value, name))
}

// integral floats such as "1.0" are accepted, tables written from float frames use them
fn parse_channel(value: &str) -> Result<i64, String> {
    if let Ok(channel) = value.parse::<i64>() {
        return Ok(channel);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(format!("'{}' is not an integer channel", value)),
    }
}

fn csv_error(path: &Path, e: csv::Error) -> PipelineError {
    if !e.is_io_error() {
        return PipelineError::malformed(path, e.to_string());
    }
    match e.into_kind() {
        csv::ErrorKind::Io(source) => PipelineError::io(path, source),
        other => PipelineError::malformed(path, format!("{:?}", other)),
    }
}

/// Reads localizations from a tab-separated table with a header row.
///
/// # Arguments
///
/// * `path` - path to the points table
///
/// # Returns
///
/// * points in file order, coordinates still in physical units
///
pub fn load_points(path: &Path) -> PipelineResult<Vec<Point>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
    let columns = PointColumns::resolve(&headers).map_err(|reason| PipelineError::malformed(path, reason))?;
    debug!("{}: using {:?} column naming", path.display(), columns.naming);

    let mut points = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        // header is line 1
        let point = columns
            .parse(&record)
            .map_err(|reason| PipelineError::malformed(path, format!("line {}: {}", row + 2, reason)))?;
        points.push(point);
    }

    Ok(points)
}

/// A place a 2-D label array can be read from with a chosen element type.
trait LabelSource {
    fn read_as<T: ReadableElement>(&mut self) -> Result<Array2<T>, String>;
}

struct NpyLabels<'a> {
    path: &'a Path,
}

impl LabelSource for NpyLabels<'_> {
    fn read_as<T: ReadableElement>(&mut self) -> Result<Array2<T>, String> {
        let file = File::open(self.path).map_err(|e| e.to_string())?;
        Array2::<T>::read_npy(file).map_err(|e| e.to_string())
    }
}

struct NpzLabels {
    archive: NpzReader<File>,
    member: String,
}

impl LabelSource for NpzLabels {
    fn read_as<T: ReadableElement>(&mut self) -> Result<Array2<T>, String> {
        self.archive.by_name(&self.member).map_err(|e| e.to_string())
    }
}

fn to_labels<T>(path: &Path, array: Array2<T>) -> PipelineResult<Array2<u32>>
where
    T: Copy + TryInto<u32> + std::fmt::Display,
{
    let labels = array
        .iter()
        .map(|&v| {
            v.try_into()
                .map_err(|_| PipelineError::malformed(path, format!("label {} is not a valid mask id", v)))
        })
        .collect::<PipelineResult<Vec<u32>>>()?;

    Array2::from_shape_vec(array.dim(), labels).map_err(|e| PipelineError::malformed(path, e.to_string()))
}

// numpy writes i64 by default, segmentation tools mostly u16/i32
fn read_labels<S: LabelSource>(path: &Path, source: &mut S) -> PipelineResult<Array2<u32>> {
    let mut last_error;

    macro_rules! try_dtype {
        ($t:ty) => {
            match source.read_as::<$t>() {
                Ok(array) => return to_labels(path, array),
                Err(e) => last_error = e,
            }
        };
    }

    try_dtype!(i64);
    try_dtype!(i32);
    try_dtype!(u16);
    try_dtype!(u32);
    try_dtype!(u8);
    try_dtype!(u64);
    try_dtype!(i16);

    Err(PipelineError::malformed(
        path,
        format!("expected a 2-D integer label array ({})", last_error),
    ))
}

fn load_npz_masks(path: &Path) -> PipelineResult<MaskRaster> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut archive = NpzReader::new(file).map_err(|e| PipelineError::npy(path, e))?;
    let names = archive.names().map_err(|e| PipelineError::npy(path, e))?;

    let npy_member = format!("{}.npy", MASKS_KEY);
    let member = names
        .into_iter()
        .find(|name| name == MASKS_KEY || *name == npy_member)
        .ok_or_else(|| PipelineError::MissingData {
            path: path.to_path_buf(),
            key: MASKS_KEY.to_string(),
        })?;

    let labels = read_labels(path, &mut NpzLabels { archive, member })?;
    Ok(MaskRaster::new(labels))
}

fn load_npy_masks(path: &Path) -> PipelineResult<MaskRaster> {
    if !path.is_file() {
        return Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        ));
    }
    let labels = read_labels(path, &mut NpyLabels { path })?;
    Ok(MaskRaster::new(labels))
}

/// Loads the label raster of a segmentation result.
///
/// `.npz` archives must contain a `masks` array, a bare `.npy` file is
/// taken as the label array itself.
pub fn load_mask_raster(path: &Path) -> PipelineResult<MaskRaster> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let raster = match extension.as_str() {
        "npz" => load_npz_masks(path)?,
        "npy" => load_npy_masks(path)?,
        other => {
            return Err(PipelineError::malformed(
                path,
                format!("unsupported segmentation file extension '{}', expected .npz or .npy", other),
            ))
        }
    };

    debug!(
        "{}: {}x{} raster with {} masks",
        path.display(),
        raster.width(),
        raster.height(),
        raster.mask_ids().len()
    );
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use ndarray_npy::{NpzWriter, WriteNpyExt};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_text(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_points_physical_unit_naming() {
        let dir = tempdir().unwrap();
        let path = write_text(
            dir.path(),
            "points.txt",
            "id\tposition_x [nm]\tposition_y [nm]\tchannel\n0\t50.0\t75.5\t0\n1\t250\t250\t1\n",
        );

        let points = load_points(&path).unwrap();
        assert_eq!(points, vec![Point::new(50.0, 75.5, 0), Point::new(250.0, 250.0, 1)]);
    }

    #[test]
    fn test_load_points_plain_naming_and_float_channel() {
        let dir = tempdir().unwrap();
        let path = write_text(
            dir.path(),
            "points.txt",
            "channel\tposition_y\tposition_x\n2.0\t10\t20\n",
        );

        let points = load_points(&path).unwrap();
        assert_eq!(points, vec![Point::new(20.0, 10.0, 2)]);
    }

    #[test]
    fn test_physical_naming_preferred() {
        let headers = StringRecord::from(vec![
            "position_x", "position_y", "position_x [nm]", "position_y [nm]", "channel",
        ]);
        let columns = PointColumns::resolve(&headers).unwrap();
        assert_eq!(columns.naming, CoordinateNaming::PhysicalUnits);
        assert_eq!((columns.x, columns.y, columns.channel), (2, 3, 4));
    }

    #[test]
    fn test_incomplete_physical_naming_falls_back() {
        let headers = StringRecord::from(vec!["channel", "position_x [nm]", "position_x", "position_y"]);
        let columns = PointColumns::resolve(&headers).unwrap();
        assert_eq!(columns.naming, CoordinateNaming::Plain);
        assert_eq!((columns.x, columns.y, columns.channel), (2, 3, 0));
    }

    #[test]
    fn test_load_points_unknown_naming() {
        let dir = tempdir().unwrap();
        let path = write_text(dir.path(), "points.txt", "x\ty\tchannel\n1\t2\t0\n");

        match load_points(&path) {
            Err(PipelineError::MalformedInput { reason, .. }) => assert!(reason.contains("position_x")),
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_load_points_missing_channel() {
        let dir = tempdir().unwrap();
        let path = write_text(dir.path(), "points.txt", "position_x\tposition_y\n1\t2\n");
        assert!(matches!(load_points(&path), Err(PipelineError::MalformedInput { .. })));
    }

    #[test]
    fn test_load_points_bad_value_reports_line() {
        let dir = tempdir().unwrap();
        let path = write_text(
            dir.path(),
            "points.txt",
            "position_x\tposition_y\tchannel\n1\t2\t0\nabc\t2\t0\n",
        );

        match load_points(&path) {
            Err(PipelineError::MalformedInput { reason, .. }) => assert!(reason.starts_with("line 3")),
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_load_points_fractional_channel_rejected() {
        let dir = tempdir().unwrap();
        let path = write_text(dir.path(), "points.txt", "position_x\tposition_y\tchannel\n1\t2\t0.5\n");
        assert!(matches!(load_points(&path), Err(PipelineError::MalformedInput { .. })));
    }

    #[test]
    fn test_load_points_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_points(&dir.path().join("nope.txt"));
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_load_npz_masks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.npz");
        let masks: Array2<u16> = array![[0, 1], [2, 2]];
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("outlines", &Array2::<u16>::zeros((2, 2))).unwrap();
        npz.add_array("masks", &masks).unwrap();
        npz.finish().unwrap();

        let raster = load_mask_raster(&path).unwrap();
        assert_eq!(raster.labels(), &array![[0u32, 1], [2, 2]]);
        assert_eq!(raster.mask_ids(), vec![1, 2]);
    }

    #[test]
    fn test_load_npz_missing_masks_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("outlines", &Array2::<u16>::zeros((2, 2))).unwrap();
        npz.finish().unwrap();

        match load_mask_raster(&path) {
            Err(PipelineError::MissingData { key, .. }) => assert_eq!(key, MASKS_KEY),
            other => panic!("expected MissingData, got {:?}", other),
        }
    }

    #[test]
    fn test_load_bare_npy_i64() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("masks.npy");
        let masks: Array2<i64> = array![[0, 3, 3], [0, 0, 9]];
        masks.write_npy(File::create(&path).unwrap()).unwrap();

        let raster = load_mask_raster(&path).unwrap();
        assert_eq!(raster.width(), 3);
        assert_eq!(raster.height(), 2);
        assert_eq!(raster.mask_ids(), vec![3, 9]);
    }

    #[test]
    fn test_negative_label_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("masks.npy");
        let masks: Array2<i32> = array![[0, -1]];
        masks.write_npy(File::create(&path).unwrap()).unwrap();

        assert!(matches!(load_mask_raster(&path), Err(PipelineError::MalformedInput { .. })));
    }

    #[test]
    fn test_three_dimensional_array_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("masks.npy");
        Array3::<u16>::zeros((2, 2, 2)).write_npy(File::create(&path).unwrap()).unwrap();

        assert!(matches!(load_mask_raster(&path), Err(PipelineError::MalformedInput { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = write_text(dir.path(), "seg.pkl", "not an array");
        assert!(matches!(load_mask_raster(&path), Err(PipelineError::MalformedInput { .. })));
    }
}

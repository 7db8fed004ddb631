use crate::{common::*, runner::ScoreTable};
use ndarray::Array1;
use ndarray_npy::NpzWriter;

/// Writes the compressed `.npz` archive with the score matrix, label
/// matrix, and sampled row indices. An existing archive is replaced.
pub fn write_archive(path: &Path, table: &ScoreTable, indexes: &[usize]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }

    let file = fs::File::create(path)
        .with_context(|| format!("failed to create archive '{}'", path.display()))?;
    let mut npz = NpzWriter::new_compressed(file);

    npz.add_array("sgmd", &table.scores)?;
    npz.add_array("labels", &table.labels)?;

    let indexes = Array1::from(indexes.iter().map(|&index| index as i64).collect::<Vec<_>>());
    npz.add_array("example_indexes", &indexes)?;
    npz.finish()?;

    Ok(())
}

/// Writes the ordered class-name table as a JSON array.
pub fn write_class_table(path: &Path, classes: &IndexSet<String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(classes)?;
    fs::write(path, text)
        .with_context(|| format!("failed to write class table '{}'", path.display()))?;
    Ok(())
}

/// Copies every sampled row's source image into `dir`, named by its row
/// index. Existing files are overwritten; partial output is left in
/// place on failure.
pub fn copy_examples(dir: &Path, table: &ScoreTable, indexes: &[usize]) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create examples directory '{}'", dir.display()))?;

    for &index in indexes {
        let src = table
            .paths
            .get(index)
            .ok_or_else(|| format_err!("sampled index {} is out of range", index))?;
        let dst = dir.join(format!("{}.jpg", index));
        fs::copy(src, &dst).with_context(|| {
            format!(
                "failed to copy '{}' to '{}'",
                src.display(),
                dst.display()
            )
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use ndarray_npy::NpzReader;
    use tempfile::tempdir;

    fn table_with_paths(paths: Vec<PathBuf>) -> ScoreTable {
        let rows = paths.len();
        ScoreTable {
            scores: Array2::from_elem((rows, 2), 0.25),
            labels: Array2::ones((rows, 2)),
            paths,
        }
    }

    #[test]
    fn archive_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scores.npz");

        let table = ScoreTable {
            scores: array![[0.1f32, 0.9], [0.4, 0.6]],
            labels: array![[0.0f32, 1.0], [1.0, 1.0]],
            paths: vec!["a.jpg".into(), "b.jpg".into()],
        };
        write_archive(&path, &table, &[1, 0])?;

        let mut npz = NpzReader::new(fs::File::open(&path)?)?;
        let scores: Array2<f32> = npz.by_name("sgmd.npy")?;
        let labels: Array2<f32> = npz.by_name("labels.npy")?;
        let indexes: Array1<i64> = npz.by_name("example_indexes.npy")?;
        assert_eq!(scores, table.scores);
        assert_eq!(labels, table.labels);
        assert_eq!(indexes, array![1i64, 0]);
        Ok(())
    }

    #[test]
    fn archive_overwrites_existing_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scores.npz");
        fs::write(&path, b"stale")?;

        let table = table_with_paths(vec!["a.jpg".into()]);
        write_archive(&path, &table, &[0])?;

        let mut npz = NpzReader::new(fs::File::open(&path)?)?;
        let scores: Array2<f32> = npz.by_name("sgmd.npy")?;
        assert_eq!(scores.nrows(), 1);
        Ok(())
    }

    #[test]
    fn copies_examples_named_by_row_index() -> Result<()> {
        let dir = tempdir()?;
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("examples");
        fs::create_dir_all(&src_dir)?;

        let paths: Vec<PathBuf> = (0..3)
            .map(|index| {
                let path = src_dir.join(format!("{:06}.jpg", index));
                fs::write(&path, format!("image {}", index)).unwrap();
                path
            })
            .collect();
        let table = table_with_paths(paths);

        // A colliding file must be overwritten, not appended to.
        fs::create_dir_all(&out_dir)?;
        fs::write(out_dir.join("2.jpg"), b"stale contents")?;

        copy_examples(&out_dir, &table, &[2, 0])?;
        assert_eq!(fs::read(out_dir.join("2.jpg"))?, b"image 2");
        assert_eq!(fs::read(out_dir.join("0.jpg"))?, b"image 0");
        assert!(!out_dir.join("1.jpg").exists());
        Ok(())
    }

    #[test]
    fn missing_source_image_fails() -> Result<()> {
        let dir = tempdir()?;
        let table = table_with_paths(vec![dir.path().join("gone.jpg")]);
        assert!(copy_examples(&dir.path().join("examples"), &table, &[0]).is_err());
        Ok(())
    }

    #[test]
    fn class_table_is_written_in_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("labels.json");

        let classes: IndexSet<String> =
            ["person", "bicycle"].iter().map(|s| s.to_string()).collect();
        write_class_table(&path, &classes)?;

        let names: Vec<String> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(names, ["person", "bicycle"]);
        Ok(())
    }
}

use crate::common::*;

/// One dataset entry: the image's on-disk path and its multi-hot label
/// vector, index-aligned with the model class table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub labels: Vec<f32>,
}

/// The COCO validation set viewed as a multi-label classification
/// dataset: one record per image, ordered by image id.
#[derive(Debug, Clone)]
pub struct MultiLabelDataset {
    pub records: Vec<ImageRecord>,
    pub num_classes: usize,
}

#[derive(Debug, Clone)]
struct ImageEntry {
    id: usize,
    file_name: String,
}

impl MultiLabelDataset {
    pub fn load(
        dataset_dir: impl AsRef<Path>,
        split: &str,
        classes: &IndexSet<String>,
    ) -> Result<Self> {
        let dataset_dir = dataset_dir.as_ref();
        let dataset = coco::DataSet::load(dataset_dir, split).with_context(|| {
            format!(
                "failed to load COCO dataset '{}' from '{}'",
                split,
                dataset_dir.display()
            )
        })?;

        let category_names: HashMap<usize, String> = dataset
            .instances
            .categories
            .iter()
            .map(|cat| {
                let coco::Category { id, ref name, .. } = *cat;
                (id, name.to_owned())
            })
            .collect();

        // sanity check
        {
            let categories: HashSet<_> = category_names.values().collect();
            let unused_classes: Vec<_> = classes
                .iter()
                .filter(|class| !categories.contains(class))
                .collect();
            if !unused_classes.is_empty() {
                warn!(
                    "these classes never appear in the dataset: {:?}",
                    unused_classes
                );
            }
        }

        let images: Vec<ImageEntry> = dataset
            .instances
            .images
            .iter()
            .map(|image| ImageEntry {
                id: image.id,
                file_name: image.file_name.clone(),
            })
            .collect();
        let annotations: Vec<(usize, usize)> = dataset
            .instances
            .annotations
            .iter()
            .map(|ann| (ann.image_id, ann.category_id))
            .collect();

        let records =
            build_records(images, &annotations, &dataset.image_dir, &category_names, classes)?;

        Ok(Self {
            records,
            num_classes: classes.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builds one record per image, sorted by image id so iteration order is
/// stable across runs. Images without annotations keep an all-zero label
/// vector; they are dropped later by the score filter, not here.
fn build_records(
    mut images: Vec<ImageEntry>,
    annotations: &[(usize, usize)],
    image_dir: &Path,
    category_names: &HashMap<usize, String>,
    classes: &IndexSet<String>,
) -> Result<Vec<ImageRecord>> {
    let mut category_ids_by_image: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(image_id, category_id) in annotations {
        category_ids_by_image
            .entry(image_id)
            .or_default()
            .push(category_id);
    }

    images.sort_by_key(|image| image.id);

    images
        .into_iter()
        .map(|image| -> Result<_> {
            let category_ids = category_ids_by_image
                .get(&image.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let labels = label_vector(category_ids, category_names, classes)
                .with_context(|| format!("in annotations of image '{}'", image.file_name))?;

            Ok(ImageRecord {
                path: image_dir.join(&image.file_name),
                labels,
            })
        })
        .try_collect()
}

/// Resolves annotated category ids to a fixed-length multi-hot vector.
/// A category absent from the class table is a hard error rather than a
/// silent out-of-range write.
fn label_vector(
    category_ids: &[usize],
    category_names: &HashMap<usize, String>,
    classes: &IndexSet<String>,
) -> Result<Vec<f32>> {
    let mut labels = vec![0f32; classes.len()];
    for &category_id in category_ids {
        let name = category_names
            .get(&category_id)
            .ok_or_else(|| format_err!("invalid category id {} found", category_id))?;
        let index = classes.get_index_of(name).ok_or_else(|| {
            format_err!("category '{}' is not covered by the model class table", name)
        })?;
        labels[index] = 1.0;
    }
    Ok(labels)
}

/// Decodes an image and applies the deterministic inference transform:
/// fixed-size resize, float conversion, scaling to `[0, 1]`.
pub fn load_image(path: &Path, input_size: i64) -> Result<Tensor> {
    let image = tch::vision::image::load_and_resize(path, input_size, input_size)
        .with_context(|| format!("failed to load image '{}'", path.display()))?;
    Ok(image.to_kind(Kind::Float) / 255.)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_table() -> IndexSet<String> {
        ["person", "bicycle", "car"]
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn category_names() -> HashMap<usize, String> {
        [(1, "person"), (2, "bicycle"), (3, "car")]
            .iter()
            .map(|&(id, name)| (id, name.to_string()))
            .collect()
    }

    #[test]
    fn label_vector_is_multi_hot() -> Result<()> {
        let labels = label_vector(&[1, 3, 1], &category_names(), &class_table())?;
        assert_eq!(labels, vec![1.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn label_vector_rejects_unknown_category_id() {
        let result = label_vector(&[99], &category_names(), &class_table());
        assert!(result.is_err());
    }

    #[test]
    fn label_vector_rejects_category_outside_class_table() {
        let mut names = category_names();
        names.insert(4, "zebra".to_string());
        let result = label_vector(&[4], &names, &class_table());
        assert!(result.unwrap_err().to_string().contains("zebra"));
    }

    #[test]
    fn records_are_sorted_by_image_id() -> Result<()> {
        let images = vec![
            ImageEntry {
                id: 42,
                file_name: "000042.jpg".into(),
            },
            ImageEntry {
                id: 7,
                file_name: "000007.jpg".into(),
            },
            ImageEntry {
                id: 19,
                file_name: "000019.jpg".into(),
            },
        ];
        let annotations = [(42, 1), (19, 3)];

        let first = build_records(
            images.clone(),
            &annotations,
            Path::new("images"),
            &category_names(),
            &class_table(),
        )?;
        let second = build_records(
            images,
            &annotations,
            Path::new("images"),
            &category_names(),
            &class_table(),
        )?;

        let names: Vec<_> = first
            .iter()
            .map(|record| record.path.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["000007.jpg", "000019.jpg", "000042.jpg"]);
        assert_eq!(first, second);

        // Unannotated image keeps an all-zero vector.
        assert_eq!(first[0].labels, vec![0.0, 0.0, 0.0]);
        assert_eq!(first[1].labels, vec![0.0, 0.0, 1.0]);
        Ok(())
    }
}

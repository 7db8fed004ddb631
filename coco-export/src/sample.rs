use crate::{common::*, runner::ScoreTable};
use ndarray::Axis;
use rand::Rng;

impl ScoreTable {
    /// Drops every row whose label vector is all zero, compacting
    /// scores, labels, and paths together and preserving row order.
    pub fn retain_labeled(self) -> ScoreTable {
        let Self {
            scores,
            labels,
            paths,
        } = self;

        let keep: Vec<usize> = labels
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.sum() > 0.0)
            .map(|(index, _)| index)
            .collect();

        let scores = scores.select(Axis(0), &keep);
        let labels = labels.select(Axis(0), &keep);
        let paths = keep.iter().map(|&index| paths[index].clone()).collect();

        ScoreTable {
            scores,
            labels,
            paths,
        }
    }

    /// Draws `count` distinct row indices uniformly without replacement.
    /// Fails when fewer rows are retained than requested, before any
    /// output is written.
    pub fn sample_examples<R>(&self, count: usize, rng: &mut R) -> Result<Vec<usize>>
    where
        R: Rng + ?Sized,
    {
        let num_rows = self.num_rows();
        ensure!(
            count <= num_rows,
            "cannot sample {} example images from {} retained rows",
            count,
            num_rows
        );
        Ok(rand::seq::index::sample(rng, num_rows, count).into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn table_of(labels: ndarray::Array2<f32>) -> ScoreTable {
        let rows = labels.nrows();
        let cols = labels.ncols();
        let scores = ndarray::Array2::from_elem((rows, cols), 0.5);
        let paths = (0..rows)
            .map(|index| PathBuf::from(format!("{:06}.jpg", index)))
            .collect();
        ScoreTable {
            scores,
            labels,
            paths,
        }
    }

    #[test]
    fn filter_drops_zero_label_rows() {
        // Image A has 2 positive labels, B has none, C has 1.
        let table = table_of(array![
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);

        let table = table.retain_labeled();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.labels.nrows(), 2);
        assert_eq!(table.paths.len(), 2);
        assert_eq!(
            table.paths,
            [PathBuf::from("000000.jpg"), PathBuf::from("000002.jpg")]
        );
        assert!(table
            .labels
            .axis_iter(Axis(0))
            .all(|row| row.sum() > 0.0));
    }

    #[test]
    fn sampling_all_retained_rows_succeeds() -> Result<()> {
        let table = table_of(array![
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
        .retain_labeled();

        let mut rng = StdRng::seed_from_u64(0);
        let mut indexes = table.sample_examples(2, &mut rng)?;
        indexes.sort_unstable();
        assert_eq!(indexes, [0, 1]);
        Ok(())
    }

    #[test]
    fn sampling_more_than_retained_fails() {
        let table = table_of(ndarray::Array2::ones((10, 80)));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(table.sample_examples(500, &mut rng).is_err());
    }

    #[test]
    fn sampled_indexes_are_distinct_and_in_range() -> Result<()> {
        let table = table_of(ndarray::Array2::ones((100, 4)));
        let mut rng = StdRng::seed_from_u64(7);

        let indexes = table.sample_examples(50, &mut rng)?;
        assert_eq!(indexes.len(), 50);
        assert!(indexes.iter().all(|&index| index < table.num_rows()));

        let distinct: HashSet<_> = indexes.iter().collect();
        assert_eq!(distinct.len(), indexes.len());
        Ok(())
    }
}

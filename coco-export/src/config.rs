use crate::common::*;
use once_cell::sync::Lazy;
use semver::{Version, VersionReq};

pub use dataset::*;
pub use export::*;
pub use model::*;

pub static CONFIG_VERSION: Lazy<VersionReq> = Lazy::new(|| VersionReq::parse("0.1.0").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: Version,
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub export: ExportConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

mod model {
    use super::*;
    use tch_classifier::Variant;

    /// Pretrained checkpoint options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelConfig {
        /// Local path of the weight file; downloaded from `weights_url` if absent.
        pub weights_file: PathBuf,
        pub weights_url: String,
        /// Local path of the class-name table shipped with the checkpoint.
        pub classes_file: PathBuf,
        pub classes_url: String,
        pub arch: Variant,
        pub num_classes: usize,
        pub input_size: usize,
        pub use_ml_decoder: bool,
        /// The device inference runs on.
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
    }

    pub(super) fn default_device() -> Device {
        Device::cuda_if_available()
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// Root directory containing the images and the annotation JSON.
        pub dataset_dir: PathBuf,
        /// Split name, e.g. "val2017".
        pub split: String,
    }
}

mod export {
    use super::*;

    /// Output options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ExportConfig {
        pub archive_file: PathBuf,
        pub class_names_file: PathBuf,
        pub examples_dir: PathBuf,
        pub num_examples: usize,
        pub batch_size: usize,
        /// Optional RNG seed for reproducible example sampling.
        pub seed: Option<u64>,
    }
}

pub fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let version = Version::parse(&text).map_err(|err| {
        D::Error::custom(format!(
            "failed to parse version number '{}': {:?}",
            text, err
        ))
    })?;

    if !CONFIG_VERSION.matches(&version) {
        return Err(D::Error::custom(format!(
            "incompatible version: get '{}', but it is incompatible with requirement '{}'",
            version, &*CONFIG_VERSION,
        )));
    }

    Ok(version)
}

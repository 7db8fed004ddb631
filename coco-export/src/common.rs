pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use indexmap::IndexSet;
pub use itertools::Itertools as _;
pub use log::{info, warn};
pub use serde::{
    de::Error as _, Deserialize, Deserializer, Serialize, Serializer,
};
pub use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
pub use tch::{nn, nn::ModuleT as _, Device, Kind, Tensor};

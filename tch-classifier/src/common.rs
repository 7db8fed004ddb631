pub use anyhow::{ensure, Result};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::borrow::Borrow;
pub use tch::{
    nn::{self, ModuleT as _},
    Kind, Tensor,
};

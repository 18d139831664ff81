//! DataFrame handles.

mod dataframe;
mod dataframes;

pub use dataframe::{DataFrame, EngineId, FrameId, NativeFrame};
pub use dataframes::DataFrames;

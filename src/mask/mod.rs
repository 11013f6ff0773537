//! Binary dust masks: thresholding, resampling, dilation and editing

pub mod brush;
pub mod codec;
pub mod editor;
pub mod history;
pub mod morphology;

pub use brush::{MaskPoint, StrokeTool};
pub use codec::{binarize, BinaryMask, MASK_OFF, MASK_ON};
pub use editor::{low_res_size, MaskEditor};
pub use history::MaskHistory;
pub use morphology::{dilate, StructuringElement};

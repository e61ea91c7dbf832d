//! Camera colour profiles: matrices, hue/sat tables, tone curves and the
//! profile list a negative carries.

pub mod camera_profile;
pub mod hue_sat;
pub mod illuminant;
pub mod selection;
pub mod stream;
pub mod tone_curve;

pub use camera_profile::{CameraProfile, EMBEDDED_PROFILE_NAME, ProfileId};
pub use hue_sat::{HueSatDelta, HueSatMap};
pub use selection::{ProfileSet, split_camera_profile_name};
pub use stream::{add_profile_tags, write_profile_stream};
pub use tone_curve::ToneCurve;

//! Merge method selection and filtergraph construction.
//!
//! Each strategy takes the same normalized inputs (source dimensions plus
//! the shared [`CropPlan`]) and returns an ffmpeg filtergraph string. The
//! crop-geometry invariant is enforced once, in
//! [`courtcam_core::geometry::compute_crop_plan`], before any strategy
//! runs.

use courtcam_core::error::CoreError;
use courtcam_core::geometry::CropPlan;

// ---------------------------------------------------------------------------
// Method enum
// ---------------------------------------------------------------------------

/// Geometric crop + linear feather blend + horizontal stack.
pub const METHOD_SIDE_BY_SIDE: &str = "side_by_side";
/// Three-way crop with a smoothstep blend ramp.
pub const METHOD_ADVANCED_STITCH: &str = "advanced_stitch";
/// Vertical stack, no blending.
pub const METHOD_STACKED: &str = "stacked";

/// All valid method strings.
pub const VALID_METHODS: &[&str] = &[METHOD_SIDE_BY_SIDE, METHOD_ADVANCED_STITCH, METHOD_STACKED];

/// How two camera streams are combined into one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    SideBySide,
    AdvancedStitch,
    Stacked,
}

impl MergeMethod {
    /// Return the configuration string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SideBySide => METHOD_SIDE_BY_SIDE,
            Self::AdvancedStitch => METHOD_ADVANCED_STITCH,
            Self::Stacked => METHOD_STACKED,
        }
    }

    /// Parse from a string, returning an error for unknown methods.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            METHOD_SIDE_BY_SIDE => Ok(Self::SideBySide),
            METHOD_ADVANCED_STITCH => Ok(Self::AdvancedStitch),
            METHOD_STACKED => Ok(Self::Stacked),
            other => Err(CoreError::Validation(format!(
                "Unknown merge method: '{other}'. Valid methods: {}",
                VALID_METHODS.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Filtergraph construction
// ---------------------------------------------------------------------------

/// Build the filtergraph for `method` over sources `w1 x h1` and `w2 x h2`.
///
/// The returned graph reads inputs `[0:v]`/`[1:v]` and labels its output
/// `[v]`. The caller maps it with `-filter_complex` and `-map "[v]"`.
pub fn build_filtergraph(
    method: MergeMethod,
    plan: &CropPlan,
    w1: u32,
    w2: u32,
) -> String {
    match method {
        MergeMethod::SideBySide => feathered_hstack(plan, w1, LINEAR_RAMP),
        MergeMethod::AdvancedStitch => feathered_hstack(plan, w1, SMOOTHSTEP_RAMP),
        MergeMethod::Stacked => stacked(plan, w2),
    }
}

/// Linear left-to-right blend ramp.
const LINEAR_RAMP: &str = "A*(1-X/W)+B*(X/W)";

/// Smoothstep ramp: eases in and out of the seam.
const SMOOTHSTEP_RAMP: &str =
    "A*(1-(3*pow(X/W,2)-2*pow(X/W,3)))+B*(3*pow(X/W,2)-2*pow(X/W,3))";

/// Crop each source's main region and inner overlap band, blend the bands
/// with `ramp`, stack left-main / blend / right-main.
fn feathered_hstack(plan: &CropPlan, w1: u32, ramp: &str) -> String {
    let h = plan.height;
    let f = plan.overlap_width;
    let trim = plan.edge_trim;
    let lm = plan.left_main_width;
    let rm = plan.right_main_width;
    // The left source's overlap band starts where its main region ends.
    let left_band_x = w1 - f;

    format!(
        "[0:v]crop={lm}:{h}:{trim}:0[left];\
         [0:v]crop={f}:{h}:{left_band_x}:0[lband];\
         [1:v]crop={f}:{h}:0:0[rband];\
         [lband][rband]blend=all_expr='{ramp}'[seam];\
         [1:v]crop={rm}:{h}:{f}:0[right];\
         [left][seam][right]hstack=inputs=3[v]"
    )
}

/// Scale both sources to the first source's width and stack vertically.
fn stacked(plan: &CropPlan, _w2: u32) -> String {
    let h = plan.height;
    format!(
        "[0:v]scale=-2:{h}[top];\
         [1:v]scale=-2:{h}[bottom];\
         [top][bottom]vstack=inputs=2[v]"
    )
}

//! Constant-buffer layout classification.

use crate::container::{Container, FOURCC_RDEF};
use crate::error::DxbcError;
use crate::rdef::{input_type, Rdef};

pub const CAMERA_CBUFFER: &str = "CBufCommonPerCamera";
pub const MODEL_INSTANCE_CBUFFER: &str = "CBufModelInstance";

/// Which engine revision laid out this shader's constant buffers.
///
/// The newer revision hosts the per-camera buffer at slot 3 and the
/// per-instance buffer at slot 2; the legacy engine expects the reverse.
#[derive(Clone, Debug)]
pub struct CbLayout {
    pub camera_slot: Option<u32>,
    pub model_instance_slot: Option<u32>,
    pub needs_swap: bool,
    /// Human-readable classification note, for logging only.
    pub reason: String,
}

pub fn detect_layout(blob: &[u8]) -> Result<CbLayout, DxbcError> {
    let container = Container::parse(blob)?;

    let mut camera_slot = None;
    let mut model_instance_slot = None;

    if let Some(chunk) = container.find_chunk(FOURCC_RDEF) {
        let rdef = Rdef::parse(blob, chunk)?;
        for binding in rdef.bindings(blob) {
            if binding.input_type != input_type::CBUFFER {
                continue;
            }
            match rdef.name_at(blob, binding.name_offset) {
                Some(CAMERA_CBUFFER) => camera_slot = Some(binding.bind_point),
                Some(MODEL_INSTANCE_CBUFFER) => model_instance_slot = Some(binding.bind_point),
                _ => {}
            }
        }
    }

    let (needs_swap, reason) = match camera_slot {
        Some(3) => (true, format!("{CAMERA_CBUFFER} at cb3, new layout")),
        Some(2) => (false, format!("{CAMERA_CBUFFER} at cb2, legacy layout")),
        Some(slot) => (false, format!("unknown layout: {CAMERA_CBUFFER} at cb{slot}")),
        None => (false, format!("unknown layout: no {CAMERA_CBUFFER} binding")),
    };

    Ok(CbLayout {
        camera_slot,
        model_instance_slot,
        needs_swap,
        reason,
    })
}

//! The per-blob driver.
//!
//! Pass order is a correctness contract, not a preference: the sun-data pass
//! matches the pre-swap `cb2` index and therefore must run before the
//! CB2<->CB3 swap, which runs last. Uber-flag and ClusteredLighting key on
//! `cb0` and the RDEF size respectively, which the swap never touches.

use tracing::{debug, info};

use crate::checksum::update_checksum;
use crate::container::Container;
use crate::error::DxbcError;
use crate::layout::{detect_layout, CbLayout};
use crate::passes::{
    cb_swap, clustered_lighting, shadow_blend, srv_remap, sun_data, uber_flags, PassReport,
};

#[derive(Clone, Debug)]
pub struct PatchOptions {
    /// Apply the name-keyed SRV moves of the legacy slot layout.
    pub legacy_srv: bool,
    /// Run the shadow-blend multiply removal. Off by default: the matcher
    /// can hit multiplies that only look like the blend (see the pass docs).
    pub enable_shadow_blend: bool,
    /// Extra `(source_slot, target_slot)` SRV moves, applied by slot alone.
    pub custom_srv_remaps: Vec<(u32, u32)>,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            legacy_srv: true,
            enable_shadow_blend: false,
            custom_srv_remaps: Vec::new(),
        }
    }
}

/// Aggregated result of one `patch` call.
#[derive(Clone, Debug)]
pub struct PatchReport {
    pub layout: CbLayout,
    pub shex_patches: u32,
    pub rdef_patches: u32,
    pub srv_patches: u32,
    /// `(pass name, what it did)`, in execution order.
    pub passes: Vec<(&'static str, PassReport)>,
}

impl PatchReport {
    pub fn mutated(&self) -> bool {
        self.shex_patches > 0 || self.rdef_patches > 0 || self.srv_patches > 0
    }

    fn record(&mut self, name: &'static str, report: PassReport) {
        if let Some(note) = &report.note {
            debug!(pass = name, "{note}");
        }
        self.shex_patches += report.shex_tokens;
        self.rdef_patches += report.rdef_fields;
        self.srv_patches += report.srv_slots;
        self.passes.push((name, report));
    }
}

/// Patches one FXC blob in place and repairs the container checksum.
///
/// Structural rejects leave the blob untouched. The checksum is rewritten
/// once, after the last pass, and only when something actually changed.
pub fn patch(blob: &mut [u8], options: &PatchOptions) -> Result<PatchReport, DxbcError> {
    // Validate up front so no pass starts on a malformed container.
    Container::parse(blob)?;

    let layout = detect_layout(blob)?;
    debug!(
        camera = ?layout.camera_slot,
        model_instance = ?layout.model_instance_slot,
        "{}",
        layout.reason
    );

    let mut report = PatchReport {
        layout: layout.clone(),
        shex_patches: 0,
        rdef_patches: 0,
        srv_patches: 0,
        passes: Vec::new(),
    };

    if layout.needs_swap {
        report.record("sun_data", sun_data::run(blob)?);
    }
    report.record("uber_flag_bit2", uber_flags::run(blob, 2)?);
    report.record("uber_flag_bit1", uber_flags::run(blob, 1)?);
    if options.enable_shadow_blend {
        report.record("shadow_blend", shadow_blend::run(blob)?);
    }
    report.record(
        "srv_remap",
        srv_remap::run(blob, options.legacy_srv, &options.custom_srv_remaps)?,
    );
    report.record("clustered_lighting", clustered_lighting::run(blob)?);
    if layout.needs_swap {
        report.record("cb_swap", cb_swap::run(blob)?);
    }

    if report.mutated() {
        update_checksum(blob);
        info!(
            shex = report.shex_patches,
            rdef = report.rdef_patches,
            srv = report.srv_patches,
            "patched shader"
        );
    }

    Ok(report)
}

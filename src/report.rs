//! Operator-facing output lines.
//!
//! These are part of the tool's contract, not diagnostics: the mask lines
//! are the only preview of what will be applied, since the server offers
//! none. Everything is written to a caller-supplied sink.

use std::io::{self, Write};

use crate::protocol::{EvcState, FeatureMask};

pub fn mask_line(mask: &FeatureMask) -> String {
    format!(
        "mask key={:?} feature_name={:?} value={:?}",
        mask.key, mask.feature_name, mask.value
    )
}

/// One line per mask, in list order.
pub fn write_masks<W: Write + ?Sized>(out: &mut W, masks: &[FeatureMask]) -> io::Result<()> {
    for mask in masks {
        writeln!(out, "{}", mask_line(mask))?;
    }
    Ok(())
}

pub fn write_applying<W: Write + ?Sized>(out: &mut W, baseline: &str, vm: &str) -> io::Result<()> {
    writeln!(out, "Applying EVC mode {baseline} to {vm}")?;
    out.flush()
}

pub fn write_applied<W: Write + ?Sized>(out: &mut W, baseline: &str, vm: &str) -> io::Result<()> {
    writeln!(out, "EVC mode {baseline} applied to {vm}")
}

pub fn write_dry_run<W: Write + ?Sized>(out: &mut W, baseline: &str, vm: &str) -> io::Result<()> {
    writeln!(out, "Dry run: EVC mode {baseline} not applied to {vm}")
}

/// Supported baselines, one per line: `key<TAB>label<TAB>n masks`.
///
/// The cluster's current mode is prefixed with `*`, the others with a space.
pub fn write_baselines<W: Write + ?Sized>(out: &mut W, state: &EvcState) -> io::Result<()> {
    let current = state.current_evc_mode_key.as_deref();
    for mode in &state.supported_evc_mode {
        let marker = if current == Some(mode.key.as_str()) { '*' } else { ' ' };
        writeln!(
            out,
            "{marker}{}\t{}\t{} masks",
            mode.key,
            mode.label,
            mode.feature_mask.len()
        )?;
    }
    Ok(())
}

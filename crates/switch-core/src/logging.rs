//! Thin wrapper over the teacher's `infra-common::logging::init` (spec §9
//! ambient stack): the engine crate doesn't configure its own subscriber,
//! it just re-exposes the one shared setup point so a host only imports
//! `switch_core::logging` instead of reaching into `infra-common` itself.

pub fn init() {
    sipswitch_infra_common::logging::init();
}

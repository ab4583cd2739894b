// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deciding what the next boot should do.
//!
//! [`resolve`] turns the reboot command, the persisted configuration and the
//! hardware profile into a [`ResolvedTarget`]. It touches no hardware and
//! keeps no state, so the whole decision table can be exercised on the host.
//!
//! Priority, highest first:
//!
//! 1. A recognized reboot command. An unrecognized one is traced and ignored.
//! 2. The persisted action, if set. An unrecognized one is traced and leaves
//!    the target at [`RebootReason::Nop`].
//! 3. On [`HardwareProfile::Compact`], a panic earlier in this boot turns
//!    whatever was decided into [`RebootReason::Panic`].

use crate::store::PayloadSlot;
use crate::HardwareProfile;
use r2p_handoff::{
    BootCfg, BootConfig, BootConfigExtra, CompactReason, ExtraCfg,
    RebootReason, ID_LEN,
};
use ringbuf::{ringbuf, ringbuf_entry};

/// Reboot commands, as passed down by whoever asked for the reboot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Recovery,
    Bootloader,
    ForcedRecovery,
    Payload,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "recovery" => Some(Command::Recovery),
            "bootloader" => Some(Command::Bootloader),
            "forced-recovery" => Some(Command::ForcedRecovery),
            "payload" => Some(Command::Payload),
            _ => None,
        }
    }
}

/// Persisted actions, as written to the `action` attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    SelfBoot,
    ViaPayload,
    Bootloader,
    Ums,
    Normal,
}

impl Action {
    pub fn parse(text: &[u8]) -> Option<Self> {
        match text {
            b"self" => Some(Action::SelfBoot),
            b"via-payload" => Some(Action::ViaPayload),
            b"bootloader" => Some(Action::Bootloader),
            b"ums" => Some(Action::Ums),
            b"normal" => Some(Action::Normal),
            _ => None,
        }
    }

    pub fn reason(self) -> RebootReason {
        match self {
            Action::SelfBoot | Action::ViaPayload => RebootReason::SelfBoot,
            Action::Bootloader => RebootReason::Menu,
            Action::Ums => RebootReason::Ums,
            Action::Normal => RebootReason::Nop,
        }
    }
}

/// Everything the decision depends on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolverInput<'a> {
    pub command: Option<&'a str>,
    pub action: &'a [u8],
    pub entry_id: &'a [u8],
    pub param1: i32,
    pub param2: i32,
    pub hardware: HardwareProfile,
    pub panic_occurred: bool,
}

/// Target-specific fields shared by both encodings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BootFields {
    pub boot_cfg: BootCfg,
    pub extra_cfg: ExtraCfg,
    pub autoboot_idx: u8,
    pub autoboot_list: u8,
    pub ums_idx: u8,
    /// NUL-padded; only meaningful with [`BootCfg::FROM_ID`].
    pub entry_id: [u8; ID_LEN],
}

impl BootFields {
    fn for_reason(reason: RebootReason, input: &ResolverInput<'_>) -> Self {
        let mut f = BootFields::default();
        match reason {
            RebootReason::SelfBoot | RebootReason::Recovery => {
                f.boot_cfg = BootCfg::AUTOBOOT_EN;
                if input.entry_id.is_empty() {
                    // The bootloader stores these as bytes.
                    f.autoboot_idx = input.param1 as u8;
                    f.autoboot_list = input.param2 as u8;
                } else {
                    f.boot_cfg |= BootCfg::FROM_ID;
                    let n = input.entry_id.len().min(ID_LEN - 1);
                    f.entry_id[..n].copy_from_slice(&input.entry_id[..n]);
                }
            }
            RebootReason::Menu => {
                f.boot_cfg = BootCfg::AUTOBOOT_EN;
            }
            RebootReason::Ums => {
                f.boot_cfg = BootCfg::AUTOBOOT_EN;
                f.extra_cfg = ExtraCfg::UMS;
                f.ums_idx = input.param1 as u8;
            }
            RebootReason::Nop | RebootReason::Panic => (),
        }
        f
    }
}

/// The outcome of [`resolve`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub reason: RebootReason,
    pub fields: BootFields,
    /// Which staged payload the reboot wants.
    pub payload: PayloadSlot,
    /// Leave this reboot alone entirely.
    pub abort: bool,
}

impl ResolvedTarget {
    const ABORT: Self = Self {
        reason: RebootReason::Nop,
        fields: BootFields {
            boot_cfg: BootCfg::empty(),
            extra_cfg: ExtraCfg::empty(),
            autoboot_idx: 0,
            autoboot_list: 0,
            ums_idx: 0,
            entry_id: [0; ID_LEN],
        },
        payload: PayloadSlot::Default,
        abort: true,
    };

    /// The legacy encoding of this target.
    pub fn boot_config(&self) -> BootConfig {
        let f = &self.fields;
        let extra = if f.boot_cfg.contains(BootCfg::FROM_ID) {
            BootConfigExtra::from_id(&f.entry_id)
        } else if f.extra_cfg.contains(ExtraCfg::UMS) {
            BootConfigExtra::Ums(f.ums_idx)
        } else {
            BootConfigExtra::empty()
        };
        BootConfig {
            boot_cfg: f.boot_cfg,
            autoboot: f.autoboot_idx,
            autoboot_list: f.autoboot_list,
            extra_cfg: f.extra_cfg,
            extra,
        }
    }

    /// The compact encoding of this target.
    pub fn compact(&self) -> CompactReason {
        CompactReason::new(
            self.reason,
            self.fields.autoboot_idx,
            self.fields.autoboot_list != 0,
            self.fields.ums_idx,
        )
    }
}

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    UnknownCommand([u8; 16]),
    UnknownAction([u8; 16]),
    ForcedRecoveryAbort,
    PanicOverride(RebootReason),
    Resolved {
        reason: RebootReason,
        payload: PayloadSlot,
        abort: bool,
    },
}

ringbuf!(Trace, 16, Trace::None);

/// First bytes of an unrecognized string, for the trace ring.
fn prefix(text: &[u8]) -> [u8; 16] {
    let mut out = [0; 16];
    let n = text.len().min(out.len());
    out[..n].copy_from_slice(&text[..n]);
    out
}

pub fn resolve(input: &ResolverInput<'_>) -> ResolvedTarget {
    let mut target = decide(input);

    if input.hardware == HardwareProfile::Compact && input.panic_occurred {
        ringbuf_entry!(Trace::PanicOverride(target.reason));
        target = ResolvedTarget {
            reason: RebootReason::Panic,
            fields: BootFields::default(),
            payload: PayloadSlot::Default,
            abort: false,
        };
    }

    ringbuf_entry!(Trace::Resolved {
        reason: target.reason,
        payload: target.payload,
        abort: target.abort,
    });
    target
}

/// Rules 1 and 2: the command, then the persisted action.
fn decide(input: &ResolverInput<'_>) -> ResolvedTarget {
    let mut reason = RebootReason::Nop;
    let mut payload = PayloadSlot::Default;

    let command = input.command.and_then(|text| {
        let c = Command::parse(text);
        if c.is_none() {
            ringbuf_entry!(Trace::UnknownCommand(prefix(text.as_bytes())));
        }
        c
    });

    match command {
        Some(Command::Recovery) => reason = RebootReason::Recovery,
        Some(Command::Bootloader) => reason = RebootReason::Menu,
        Some(Command::Payload) => payload = PayloadSlot::Custom,
        // The boot ROM handles RCM entry on the compact parts; the legacy
        // parts get there through an ordinary reboot.
        Some(Command::ForcedRecovery) => {
            if input.hardware == HardwareProfile::Compact {
                ringbuf_entry!(Trace::ForcedRecoveryAbort);
                return ResolvedTarget::ABORT;
            }
        }
        None if !input.action.is_empty() => match Action::parse(input.action)
        {
            Some(action) => reason = action.reason(),
            None => {
                ringbuf_entry!(Trace::UnknownAction(prefix(input.action)));
            }
        },
        None => (),
    }

    ResolvedTarget {
        reason,
        fields: BootFields::for_reason(reason, input),
        payload,
        abort: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(
        command: Option<&'static str>,
        action: &'static str,
    ) -> ResolverInput<'static> {
        ResolverInput {
            command,
            action: action.as_bytes(),
            entry_id: b"",
            param1: 0,
            param2: 0,
            hardware: HardwareProfile::Legacy,
            panic_occurred: false,
        }
    }

    #[test]
    fn recovery_command_beats_action() {
        for hardware in [HardwareProfile::Legacy, HardwareProfile::Compact] {
            for action in ["", "ums", "bootloader", "normal", "garbage"] {
                let t = resolve(&ResolverInput {
                    hardware,
                    ..input(Some("recovery"), action)
                });
                assert_eq!(t.reason, RebootReason::Recovery);
                assert!(!t.abort);
            }
        }
    }

    #[test]
    fn bootloader_action_is_menu_without_id() {
        let t = resolve(&ResolverInput {
            entry_id: b"ignored",
            ..input(None, "bootloader")
        });
        assert_eq!(t.reason, RebootReason::Menu);

        let cfg = t.boot_config();
        assert_eq!(cfg.boot_cfg, BootCfg::AUTOBOOT_EN);
        assert_eq!(cfg.extra_cfg, ExtraCfg::empty());
        assert_eq!(cfg.extra, BootConfigExtra::empty());
    }

    #[test]
    fn ums_action_carries_index() {
        let t = resolve(&ResolverInput {
            param1: 2,
            ..input(None, "ums")
        });
        assert_eq!(t.reason, RebootReason::Ums);

        let cfg = t.boot_config();
        assert!(cfg.extra_cfg.contains(ExtraCfg::UMS));
        assert_eq!(cfg.extra, BootConfigExtra::Ums(2));
        assert_eq!(t.compact().ums_idx(), 2);
    }

    #[test]
    fn self_boot_with_entry_id() {
        let t = resolve(&ResolverInput {
            entry_id: b"L4T",
            param1: 3,
            ..input(None, "via-payload")
        });
        assert_eq!(t.reason, RebootReason::SelfBoot);
        assert_eq!(t.fields.boot_cfg, BootCfg::AUTOBOOT_EN | BootCfg::FROM_ID);
        assert_eq!(t.fields.autoboot_idx, 0);
        assert_eq!(t.boot_config().extra, BootConfigExtra::from_id(b"L4T"));
    }

    #[test]
    fn self_boot_with_index() {
        let t = resolve(&ResolverInput {
            param1: 4,
            param2: 1,
            ..input(None, "self")
        });
        assert_eq!(t.fields.boot_cfg, BootCfg::AUTOBOOT_EN);
        assert_eq!(t.fields.autoboot_idx, 4);
        assert_eq!(t.fields.autoboot_list, 1);

        let c = t.compact();
        assert_eq!(c.reason(), Some(RebootReason::SelfBoot));
        assert_eq!(c.autoboot_idx(), 4);
        assert!(c.autoboot_list());
    }

    #[test]
    fn unknown_strings_fall_through() {
        let t = resolve(&input(Some("poweroff"), "bootloader"));
        assert_eq!(t.reason, RebootReason::Menu);

        let t = resolve(&input(Some("poweroff"), "reticulate"));
        assert_eq!(t.reason, RebootReason::Nop);
        assert_eq!(t.payload, PayloadSlot::Default);
    }

    #[test]
    fn payload_command_requests_custom_slot() {
        let t = resolve(&input(Some("payload"), "ums"));
        assert_eq!(t.reason, RebootReason::Nop);
        assert_eq!(t.payload, PayloadSlot::Custom);
    }

    #[test]
    fn forced_recovery_depends_on_hardware() {
        let t = resolve(&input(Some("forced-recovery"), "ums"));
        assert_eq!(t.reason, RebootReason::Nop);
        assert!(!t.abort);

        let t = resolve(&ResolverInput {
            hardware: HardwareProfile::Compact,
            ..input(Some("forced-recovery"), "ums")
        });
        assert!(t.abort);
    }

    #[test]
    fn panic_override_is_compact_only() {
        let t = resolve(&ResolverInput {
            panic_occurred: true,
            ..input(Some("recovery"), "")
        });
        assert_eq!(t.reason, RebootReason::Recovery);

        let t = resolve(&ResolverInput {
            panic_occurred: true,
            hardware: HardwareProfile::Compact,
            param1: 7,
            ..input(Some("recovery"), "")
        });
        assert_eq!(t.reason, RebootReason::Panic);
        assert_eq!(t.compact().bits(), RebootReason::Panic as u16);
    }

    fn any_text() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("recovery".to_string()),
            Just("bootloader".to_string()),
            Just("forced-recovery".to_string()),
            Just("payload".to_string()),
            Just("self".to_string()),
            Just("via-payload".to_string()),
            Just("ums".to_string()),
            Just("normal".to_string()),
            "[a-z-]{0,12}",
        ]
    }

    proptest! {
        #[test]
        fn resolve_is_pure(
            command in proptest::option::of(any_text()),
            action in any_text(),
            entry_id in "[A-Za-z0-9]{0,9}",
            param1 in any::<i32>(),
            param2 in any::<i32>(),
            compact in any::<bool>(),
            panic_occurred in any::<bool>(),
        ) {
            let input = ResolverInput {
                command: command.as_deref(),
                action: action.as_bytes(),
                entry_id: entry_id.as_bytes(),
                param1,
                param2,
                hardware: if compact {
                    HardwareProfile::Compact
                } else {
                    HardwareProfile::Legacy
                },
                panic_occurred,
            };
            let first = resolve(&input);
            prop_assert_eq!(first, resolve(&input));

            if compact && panic_occurred {
                prop_assert_eq!(first.reason, RebootReason::Panic);
                prop_assert!(!first.abort);
            } else if command.as_deref() == Some("recovery") {
                prop_assert_eq!(first.reason, RebootReason::Recovery);
            }
        }
    }
}

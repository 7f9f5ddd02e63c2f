// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build-time support for retention zone declarations.
//!
//! A startup crate's `build.rs` calls [`ZoneConfig::load`] and then
//! [`ZoneConfig::write_to_out_dir`], and `include!`s the resulting
//! `zones.rs`. The generated `zone_table()` resolves every zone's region (and
//! image, for zones reloaded from one) from linker symbols at startup.

use anyhow::{bail, Context, Result};
use quote::{format_ident, quote};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::Path;

/// Environment variable that, when set, holds the full text of the zone
/// declarations and takes precedence over `zones.toml`.
pub const CONFIG_ENV: &str = "RETENTION_ZONES_CONFIG";

const MAX_ZONES: usize = u8::MAX as usize;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ZoneConfig {
    zones: BTreeMap<String, ZoneDecl>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ZoneDecl {
    policy: Policy,
    domain: Domain,
    /// Linker symbol at the first byte of the zone.
    start: String,
    /// Linker symbol one past the last byte of the zone.
    end: String,
    /// Linker symbol at the first byte of the zone's image in flash.
    #[serde(default)]
    load: Option<String>,
}

macro_rules! to_tokens_enum {
    ($(#[$m:meta])* enum $Enum:ident => $Target:ident { $($Variant:ident),* $(,)? }) => {
        $(#[$m])*
        enum $Enum {
            $($Variant),*
        }

        impl quote::ToTokens for $Enum {
            fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
                let variant = match self {
                    $(Self::$Variant => stringify!($Variant)),*
                };
                let variant = proc_macro2::Ident::new(
                    variant,
                    proc_macro2::Span::call_site(),
                );
                tokens.extend(quote! { retention_zones::$Target::#variant });
            }
        }
    };
}

to_tokens_enum! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    enum Policy => RetentionPolicy {
        NeverCleared,
        ClearedOnColdBoot,
        ClearedOnNormalBoot,
        ReloadFromImage,
    }
}

to_tokens_enum! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    enum Domain => PowerDomain {
        RtcFast,
        RtcSlow,
        Main,
    }
}

/// Name of the `zone_ids` constant for a zone.
fn const_name(zone: &str) -> String {
    zone.to_uppercase().replace('-', "_")
}

impl ZoneConfig {
    /// Reads the declarations from `$RETENTION_ZONES_CONFIG`, or failing that
    /// from `zones.toml` in the crate being built, and validates them.
    pub fn load() -> Result<Self> {
        println!("cargo:rerun-if-env-changed={CONFIG_ENV}");

        let text = match env::var(CONFIG_ENV) {
            Ok(text) => {
                println!("--- toml for ${CONFIG_ENV} ---");
                println!("{text}");
                text
            }
            Err(_) => {
                let dir = env::var("CARGO_MANIFEST_DIR")?;
                let path = Path::new(&dir).join("zones.toml");
                println!("cargo:rerun-if-changed={}", path.display());
                std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?
            }
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).context("parsing zone declarations")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.zones.len() > MAX_ZONES {
            bail!(
                "{} zones declared; at most {MAX_ZONES} are supported",
                self.zones.len()
            );
        }

        let mut symbols = BTreeSet::new();
        let mut consts = BTreeMap::new();
        for (name, zone) in &self.zones {
            let ident = const_name(name);
            syn::parse_str::<syn::Ident>(&ident).with_context(|| {
                format!("zone {name}: `{ident}` is not a valid constant name")
            })?;
            if let Some(other) = consts.insert(ident, name) {
                bail!("zones {other} and {name} have the same constant name");
            }

            match (zone.policy, &zone.load) {
                (Policy::ReloadFromImage, None) => bail!(
                    "zone {name} is reload-from-image but names no `load` symbol"
                ),
                (Policy::ReloadFromImage, Some(_)) | (_, None) => (),
                (policy, Some(_)) => bail!(
                    "zone {name} is {policy:?} and must not name a `load` symbol"
                ),
            }

            // Both of these promise to carry contents across deep sleep, which
            // only an RTC domain can do.
            if matches!(
                zone.policy,
                Policy::NeverCleared | Policy::ClearedOnNormalBoot
            ) && zone.domain == Domain::Main
            {
                bail!(
                    "zone {name} is {:?} but lives in the main domain, \
                     which loses power in deep sleep",
                    zone.policy
                );
            }

            for sym in
                [&zone.start, &zone.end].into_iter().chain(zone.load.as_ref())
            {
                syn::parse_str::<syn::Ident>(sym).with_context(|| {
                    format!("zone {name}: `{sym}` is not a valid symbol name")
                })?;
                if !symbols.insert(sym.as_str()) {
                    bail!("zone {name}: symbol `{sym}` is used more than once");
                }
            }
        }
        Ok(())
    }

    pub fn generate(&self) -> Result<proc_macro2::TokenStream> {
        let mut symbols = vec![];
        let mut entries = vec![];
        let mut ids = vec![];

        for (index, (name, zone)) in self.zones.iter().enumerate() {
            let id = u8::try_from(index)?;
            let start = format_ident!("{}", zone.start);
            let end = format_ident!("{}", zone.end);
            let policy = zone.policy;
            let domain = zone.domain;

            let image = match &zone.load {
                Some(load) => {
                    let load = format_ident!("{}", load);
                    symbols.push(load.clone());
                    quote! {
                        unsafe {
                            retention_zones::image_at(
                                core::ptr::addr_of!(#load),
                                region.len,
                            )
                        }
                    }
                }
                None => quote! { None },
            };

            entries.push(quote! {
                {
                    let region = retention_zones::Region::from_symbols(
                        unsafe { core::ptr::addr_of!(#start) },
                        unsafe { core::ptr::addr_of!(#end) },
                    );
                    retention_zones::MemoryZone {
                        id: retention_zones::ZoneId(#id),
                        name: #name,
                        policy: #policy,
                        domain: #domain,
                        region,
                        image: #image,
                    }
                }
            });

            let id_name = format_ident!("{}", const_name(name));
            ids.push(quote! {
                pub const #id_name: retention_zones::ZoneId =
                    retention_zones::ZoneId(#id);
            });

            symbols.push(start);
            symbols.push(end);
        }

        let count = entries.len();
        Ok(quote! {
            #[allow(non_upper_case_globals)]
            extern "C" {
                #( static #symbols: u8; )*
            }

            pub const ZONE_COUNT: usize = #count;

            pub mod zone_ids {
                #( #ids )*
            }

            /// Resolves the declared zones from their linker symbols.
            #[allow(unused_unsafe)]
            pub fn zone_table() -> [retention_zones::MemoryZone; ZONE_COUNT] {
                [ #( #entries ),* ]
            }
        })
    }

    pub fn generate_source(&self) -> Result<String> {
        let file = syn::parse2::<syn::File>(self.generate()?)?;
        Ok(prettyplease::unparse(&file))
    }

    /// Writes `zones.rs` into `$OUT_DIR`.
    pub fn write_to_out_dir(&self) -> Result<()> {
        let out = env::var("OUT_DIR")?;
        let path = Path::new(&out).join("zones.rs");
        std::fs::write(&path, self.generate_source()?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

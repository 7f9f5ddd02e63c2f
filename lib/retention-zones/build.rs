// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

fn main() {
    // tests/missing_image.rs needs a load symbol that the linker resolves to
    // address 0, the same as a `PROVIDE`d symbol for an absent section.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
        println!("cargo::rustc-link-arg-tests=-Wl,--defsym=_zone_test_lma=0");
    }
    println!("cargo::rerun-if-changed=build.rs");
}

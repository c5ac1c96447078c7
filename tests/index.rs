//! Integration tests, compiled as a submodule of the library's own `#[cfg(test)]` build (see
//! `autotests = false` in `Cargo.toml` and the `#[path]` attribute in `lib.rs`) rather than as a
//! separate test binary, following the same entry-file-plus-submodules layout `interprocess` uses
//! for its own `tests/index.rs`.

#[path = "util/mod.rs"]
mod util;

mod scenarios;

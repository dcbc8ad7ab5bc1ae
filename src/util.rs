// emubench: Timed evaluation harness for emulated multi-PoP NFV platforms
// Copyright (C) 2024-2025 The emubench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Utility module collection of functions

use std::env;

use time::{format_description, OffsetDateTime};

/// Initialize stderr logging for the current process, defaulting to `info`
/// when `RUST_LOG` is not set.
///
/// Worker processes inherit the driver's environment, so both sides of an
/// experiment log with the same configuration. Record output goes to stdout
/// and must stay out of the log stream.
pub fn init_logging() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init();
}

/// Produces a timestamp `String` of the current time in YYYY-MM-DD_HH-mm-SS format.
pub fn get_timestamp() -> String {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(
            &format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]").unwrap(),
        )
        .unwrap()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timestamp_format() {
        let ts = get_timestamp();
        // e.g. 2025-03-14_16-55-02
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "_");
    }
}

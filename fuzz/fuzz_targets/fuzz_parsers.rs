//! Fuzz testing for the parsers that see caller-controlled input.
//!
//! Every request carries an `Authorization` header and a query string the
//! gateway did not produce; stored role lists and route entries are written
//! by other systems. None of these parsers may panic.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_parsers
//! cargo +nightly fuzz run fuzz_parsers -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `decode_claims`: bearer payload decoding
//! - `render_query`: query string rendering for audit records
//! - `parse_role_list`: stored role values
//! - `RouteDefinition::parse` and `CidrRange::parse`: configuration entries

#![no_main]

use gateway_guard::audit::{decode_claims, encode_user_header, render_query};
use gateway_guard::gateway::RouteDefinition;
use gateway_guard::middleware::CidrRange;
use gateway_guard::store::parse_role_list;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(claims) = decode_claims(s) {
        // Whatever decodes must also be forwardable
        let _ = encode_user_header(&claims.payload);
    }

    let _ = render_query(Some(s));
    let _ = parse_role_list(s);
    let _ = RouteDefinition::parse(s);
    let _ = CidrRange::parse(s);
});

/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The content-addressed wire model shared by every subsystem.
//!
//! Candidates, votes and certificates are persisted and gossiped as JSON with snake_case
//! field names; every fixed- or variable-length byte field travels hex-encoded. The types
//! in [`basic`] are inert newtypes; [`candidate`], [`vote`] and [`certificate`] carry the
//! active wire structures; [`credentials`] holds the ML-DSA credential framing used by
//! UTXO-style outputs.

pub mod basic;

pub mod candidate;

pub mod certificate;

pub mod credentials;

pub mod vote;

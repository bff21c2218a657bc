/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types shared by every component of the consensus core.

pub mod certificates;

pub mod crypto_primitives;

pub mod data_types;

pub mod headers;

pub mod validator_set;

pub mod vertex;

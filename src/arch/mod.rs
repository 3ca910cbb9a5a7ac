//! # Architecture Abstraction Layer
//!
//! Processor-specific code lives here. Only the Cortex-M4 port exists and
//! it is compiled only for bare-metal targets; the scheduler itself is
//! portable and unit-tested on the host.

pub mod cortex_m4;

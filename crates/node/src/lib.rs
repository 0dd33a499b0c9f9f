//! Command line shell around [ringlab-core](ringlab_core).

pub mod logging;

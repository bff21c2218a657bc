pub(crate) mod logging;

pub(crate) mod mem_safety_store;

pub(crate) mod network;

pub(crate) mod number_app;

pub(crate) mod stubs;

pub(crate) mod validators;

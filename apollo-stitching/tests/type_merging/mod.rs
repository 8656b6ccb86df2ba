mod batching;
mod setup;
mod support;

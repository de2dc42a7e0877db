//! # extension-hello
//!
//! A template extension for the hostbridge runtime.
//!
//! Linking this crate is enough to make it available: it registers itself in
//! the process-wide registry under the name `hello`. On activation it touches
//! every capability of its context:
//!
//! 1. logs `from wasm`
//! 2. evaluates `console.log('hello world!')` under the unit `foo`
//! 3. logs the value of `HOME`, or `absent` when unset
//! 4. dispatches a callback that later logs `dispatched callback`

use hostbridge_core::prelude::*;

/// Name this extension registers under.
pub const NAME: &str = "hello";

/// Logged in place of `HOME` when the variable is unset.
pub const ABSENT: &str = "absent";

hostbridge_core::register_extension!(HELLO, ExtensionRegistration {
    name: NAME,
    version: env!("CARGO_PKG_VERSION"),
    description: "Logs, evaluates a script, reads HOME and dispatches a callback",
    initializer: init,
    teardown: Some(teardown),
});

fn init(ctx: &ExtensionContext, _data: Option<&InitData>) -> bool {
    ctx.log("from wasm");

    if let Err(e) = ctx.evaluate("foo", "console.log('hello world!')") {
        ctx.log_at(LogLevel::Warn, &e.to_string());
    }

    let home = ctx.get_env("HOME").unwrap_or_else(|| ABSENT.to_string());
    ctx.log(&home);

    match ctx.dispatch(None, on_dispatch) {
        Ok(_) => true,
        Err(e) => {
            ctx.log_at(LogLevel::Error, &e.to_string());
            false
        }
    }
}

fn on_dispatch(ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
    ctx.log("dispatched callback");
    Ok(())
}

fn teardown(ctx: &ExtensionContext) {
    ctx.log_at(LogLevel::Debug, "unloading");
}

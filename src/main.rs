mod app;
mod context;
mod dispatch;
mod error;
mod host;
mod popup_core;
mod settings;
mod template;

use app::*;
use leptos::prelude::*;

fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Debug));
    mount_to_body(|| {
        view! { <App/> }
    })
}

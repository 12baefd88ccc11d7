use hypertext::prelude::*;

/// Debounced free-text search box. Each keystroke resets the 500ms htmx
/// trigger timer, so only the last pending request fires; the response
/// replaces the table fragment named by `target`.
pub struct SearchBox<'r> {
    pub endpoint: &'r str,
    pub target: &'r str,
    pub placeholder: &'r str,
}

impl<'r> Renderable for SearchBox<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            input
                type="search"
                class="form-control mb-3"
                name="q"
                placeholder=(self.placeholder)
                hx-get=(self.endpoint)
                hx-target=(self.target)
                hx-swap="outerHTML"
                hx-trigger="input changed delay:500ms, search";
        }
        .render_to(buffer);
    }
}

use hypertext::prelude::*;

/// Row of navigation buttons rendered under a page heading, linking to the
/// sibling views of the entity being shown.
pub struct Actions<'r> {
    pub links: &'r [(String, String)],
}

impl<'r> Renderable for Actions<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="btn-toolbar mb-3" role="toolbar" {
                div class="btn-group me-2" role="group" {
                    @for (href, label) in self.links {
                        a class="btn btn-sm btn-outline-secondary" href=(href) {
                            (label)
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

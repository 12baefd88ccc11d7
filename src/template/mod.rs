//! Templating code.
//!
//! This defines the [`Page`] item, which wraps every server-rendered page in
//! the shared chrome (navbar, bootstrap, htmx).

use hypertext::prelude::*;

use crate::auth::User;

pub struct Page<R: Renderable> {
    body: Option<R>,
    user: Option<User>,
}

impl<R: Renderable> Page<R> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn body(mut self, body: R) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn user_opt(mut self, user: Option<User>) -> Self {
        self.user = user;
        self
    }
}

impl<R: Renderable> Renderable for Page<R> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            html {
                head {
                    title { "Rubric" }
                    script src="https://cdn.jsdelivr.net/npm/htmx.org@2.0.7/dist/htmx.min.js" integrity="sha384-ZBXiYtYQ6hJ2Y0ZNoYuI+Nq5MqWBr+chMrS/RkXpNzQCApHEhOt2aY8EJgqwHLkJ" crossorigin="anonymous" {
                    }
                    link
                        href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css"
                        rel="stylesheet"
                        integrity="sha384-QWTKZyjpPEjISv5WaRU9OFeRpok6YctnYmDr5pNlyT2bRjXh0JMhjY6hW+ALEwIH"
                        crossorigin="anonymous";
                    meta
                        name="viewport"
                        content="width=device-width, initial-scale=1";
                }
                body class="d-flex flex-column vh-100" {
                    nav class="navbar navbar-expand"
                        style="background-color: #1f3a5f; display: flex; justify-content: space-between; align-items: center;"
                        data-bs-theme="dark" {
                        div class="container-fluid" style="display: flex; justify-content: space-between; align-items: center;" {
                            a class="navbar-brand text-white" href="/" {
                                "Rubric"
                            }
                            @if self.user.is_some() {
                                ul class="navbar-nav" style="display: flex; gap: 1rem;" data-bs-theme="dark" {
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/staff" { "Staff" }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/questions" { "Questions" }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/surveys" { "Surveys" }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/reports" { "Reports" }
                                    }
                                    @if let Some(user) = &self.user {
                                        @if user.is_admin() {
                                            li class="nav-item" {
                                                a class="nav-link text-white" href="/users" { "Users" }
                                            }
                                        }
                                    }
                                }
                            }
                            div {
                                ul class="navbar-nav" style="display: flex; gap: 1rem;" data-bs-theme="dark" {
                                    @if let Some(user) = &self.user {
                                        li class="nav-item" {
                                            span class="nav-link text-white" {
                                                (user.username)
                                            }
                                        }
                                        li class="nav-item" {
                                            form method="post" action="/logout" class="d-inline" {
                                                button type="submit" class="btn btn-link nav-link text-white" {
                                                    "Log out"
                                                }
                                            }
                                        }
                                    } @else {
                                        li class="nav-item" {
                                            a class="nav-link text-white" href="/login" {
                                                "Login"
                                            }
                                        }
                                        li class="nav-item" {
                                            a class="nav-link text-white" href="/register" {
                                                "Register"
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                    div class="flex-grow-1" {
                        @if let Some(body) = &self.body {
                            (body)
                        }
                    }
                }
            }
        }.render_to(buffer)
    }
}

impl<R: Renderable> Default for Page<R> {
    fn default() -> Self {
        Self {
            body: Default::default(),
            user: Default::default(),
        }
    }
}

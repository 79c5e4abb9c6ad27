mod helpers;
mod note;

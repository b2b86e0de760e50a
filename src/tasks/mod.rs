pub(crate) mod finalize_queue;

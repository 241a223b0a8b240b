mod helpers;
mod queue;
mod web;

mod requests;
mod runner;

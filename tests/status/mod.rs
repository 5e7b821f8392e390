mod bdd_steps;
mod reaper_steps;
mod scenarios;
mod test_helpers;

mod autocomplete;
mod console;
mod variable_tree;

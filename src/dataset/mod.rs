pub mod conllu;

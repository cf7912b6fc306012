use proc_macro::TokenStream;
use quote::quote;

/// Emits a field-sequential `BathronSerialize` impl for a plain struct.
///
/// The generated code refers to `BathronSerialize` unqualified, so the trait
/// must be in scope at the derive site.
pub fn impl_ser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    match ast.data {
        syn::Data::Struct(ref data) => {
            let statements: Vec<proc_macro2::TokenStream> = data
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| serialize_field(field, index))
                .collect();

            let expanded = quote! {
                impl BathronSerialize for #name {
                    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
                    where
                        W: std::io::Write,
                    {
                        #(#statements)*
                        Ok(())
                    }
                }
            };
            TokenStream::from(expanded)
        }
        _ => panic!("BathronSerialize can only be derived for structs"),
    }
}

fn serialize_field(field: &syn::Field, index: usize) -> proc_macro2::TokenStream {
    match field.ident.clone() {
        Some(id) => quote! { self.#id.bathron_serialize(&mut target)?; },
        None => {
            let index = syn::Index::from(index);
            quote! { self.#index.bathron_serialize(&mut target)?; }
        }
    }
}
